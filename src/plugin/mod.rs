//! Plugin registry: generators, converters and template filters.
//!
//! A registry is an ordinary value owned by the builder and built fresh for
//! every build, so registrations never leak between builds.

pub mod feed;
pub mod sitemap;

pub use feed::FeedGenerator;
pub use sitemap::SitemapGenerator;

use crate::{
    config::SiteConfig,
    content::Document,
    log,
    render::{Converter, MarkdownConverter, StringFilter},
    site::Site,
};
use anyhow::Result;
use std::sync::Arc;

/// A file a generator wants written verbatim under the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Destination-relative path, e.g. `sitemap.xml`.
    pub path: String,
    pub content: Vec<u8>,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// What one generator produced.
#[derive(Debug, Default)]
pub struct GeneratorOutput {
    pub files: Vec<GeneratedFile>,
    /// Extra documents, URL-assigned and rendered like pages.
    pub documents: Vec<Document>,
}

/// Produces extra output from a fully read site.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, site: &Site) -> Result<GeneratorOutput>;
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
pub struct PluginRegistry {
    generators: Vec<Box<dyn Generator>>,
    converters: Vec<Arc<dyn Converter>>,
    filters: Vec<(String, StringFilter)>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The Markdown converter and its `markdownify` filter, plus the
    /// generators enabled in `[plugins]`.
    pub fn with_defaults(config: &SiteConfig) -> Self {
        let mut registry = Self::new();
        let markdown = Arc::new(MarkdownConverter::new(&config.build.markdown_ext));
        let converter = Arc::clone(&markdown);
        registry.register_filter("markdownify", Arc::new(move |text: &str| converter.convert(text)));
        registry.register_converter(markdown);
        if config.plugins.sitemap {
            registry.register_generator(Box::new(SitemapGenerator));
        }
        if config.plugins.feed {
            registry.register_generator(Box::new(FeedGenerator));
        }
        registry
    }

    pub fn register_generator(&mut self, generator: Box<dyn Generator>) {
        self.generators.push(generator);
    }

    /// Converters are tried in registration order.
    pub fn register_converter(&mut self, converter: Arc<dyn Converter>) {
        self.converters.push(converter);
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: StringFilter) {
        self.filters.push((name.into(), filter));
    }

    pub fn converters(&self) -> Vec<Arc<dyn Converter>> {
        self.converters.clone()
    }

    pub fn filters(&self) -> &[(String, StringFilter)] {
        &self.filters
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).collect()
    }

    /// Run every generator. A failing generator is logged and skipped.
    pub fn run_generators(&self, site: &Site) -> Vec<(String, GeneratorOutput)> {
        self.generators
            .iter()
            .filter_map(|generator| match generator.generate(site) {
                Ok(output) => Some((generator.name().to_owned(), output)),
                Err(err) => {
                    log!("warn"; "generator `{}` failed: {:#}", generator.name(), err);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct Fixed;

    impl Generator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&self, _site: &Site) -> Result<GeneratorOutput> {
            Ok(GeneratorOutput {
                files: vec![GeneratedFile::new("robots.txt", "User-agent: *")],
                documents: Vec::new(),
            })
        }
    }

    struct Broken;

    impl Generator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn generate(&self, _site: &Site) -> Result<GeneratorOutput> {
            bail!("no luck")
        }
    }

    fn empty_site() -> Site {
        let mut config = SiteConfig::default();
        config.source = std::env::temp_dir();
        Site::new(config).unwrap()
    }

    #[test]
    fn test_defaults_follow_plugins_section() {
        let mut config = SiteConfig::default();
        assert!(PluginRegistry::with_defaults(&config).generator_names().is_empty());

        config.plugins.sitemap = true;
        config.plugins.feed = true;
        let registry = PluginRegistry::with_defaults(&config);
        assert_eq!(registry.generator_names(), vec!["sitemap", "feed"]);
        assert_eq!(registry.converters().len(), 1);
    }

    #[test]
    fn test_default_markdownify_filter() {
        let registry = PluginRegistry::with_defaults(&SiteConfig::default());
        let (name, filter) = &registry.filters()[0];
        assert_eq!(name, "markdownify");
        assert_eq!(filter("**b**").trim(), "<p><strong>b</strong></p>");
    }

    #[test]
    fn test_registries_are_independent() {
        let mut a = PluginRegistry::new();
        a.register_generator(Box::new(Fixed));
        let b = PluginRegistry::new();
        assert_eq!(a.generator_names(), vec!["fixed"]);
        assert!(b.generator_names().is_empty());
    }

    #[test]
    fn test_failing_generator_is_skipped() {
        let mut registry = PluginRegistry::new();
        registry.register_generator(Box::new(Broken));
        registry.register_generator(Box::new(Fixed));

        let outputs = registry.run_generators(&empty_site());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].0, "fixed");
        assert_eq!(outputs[0].1.files[0].path, "robots.txt");
    }

    #[test]
    fn test_register_filter() {
        let mut registry = PluginRegistry::new();
        registry.register_filter("shout", Arc::new(|s: &str| s.to_uppercase()));
        assert_eq!(registry.filters().len(), 1);
        assert_eq!((registry.filters()[0].1)("a"), "A");
    }
}
