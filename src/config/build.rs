//! `[build]` section configuration.
//!
//! Contains source directory names, permalink style, exclude patterns and
//! the build-mode flags.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Enums
// ============================================================================

/// URL slug generation mode for titles, filenames and categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugMode {
    /// Always convert to a lowercase ASCII slug (e.g., "Héllo Wörld" → "hello-world").
    On,
    /// Strip URL-hostile characters and dash whitespace, keep the rest (default).
    #[default]
    Safe,
    /// No slugification; preserve original text.
    No,
}

/// Post permalink style.
///
/// Named styles map to fixed patterns; any other string is used as a
/// custom pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PermalinkStyle {
    /// `/:categories/:year/:month/:day/:title.html` (default)
    #[default]
    Date,
    /// `/:categories/:year/:month/:day/:title/`
    Pretty,
    /// `/:year/:y_day/:title.html`
    Ordinal,
    /// `/:year/W:week/:short_day/:title.html`
    Weekdate,
    /// `/:title.html`
    None,
    /// User-supplied pattern such as `/blog/:year/:title/`.
    Custom(String),
}

impl PermalinkStyle {
    /// Placeholder pattern for this style.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Date => "/:categories/:year/:month/:day/:title.html",
            Self::Pretty => "/:categories/:year/:month/:day/:title/",
            Self::Ordinal => "/:year/:y_day/:title.html",
            Self::Weekdate => "/:year/W:week/:short_day/:title.html",
            Self::None => "/:title.html",
            Self::Custom(pattern) => pattern,
        }
    }
}

impl From<String> for PermalinkStyle {
    fn from(value: String) -> Self {
        match value.as_str() {
            "date" => Self::Date,
            "pretty" => Self::Pretty,
            "ordinal" => Self::Ordinal,
            "weekdate" => Self::Weekdate,
            "none" => Self::None,
            _ => Self::Custom(value),
        }
    }
}

impl From<PermalinkStyle> for String {
    fn from(value: PermalinkStyle) -> Self {
        match value {
            PermalinkStyle::Date => "date".into(),
            PermalinkStyle::Pretty => "pretty".into(),
            PermalinkStyle::Ordinal => "ordinal".into(),
            PermalinkStyle::Weekdate => "weekdate".into(),
            PermalinkStyle::None => "none".into(),
            PermalinkStyle::Custom(pattern) => pattern,
        }
    }
}

// ============================================================================
// Main BuildConfig
// ============================================================================

/// `[build]` section in _config.toml - build pipeline configuration.
///
/// Directory names are relative to the source root; `destination` may be
/// absolute.
///
/// # Example
/// ```toml
/// [build]
/// destination = "public"
/// permalink = "pretty"
/// exclude = ["README.md", "scripts"]
/// keep_files = [".git", "CNAME"]
/// incremental = true
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Build output directory.
    #[serde(default = "defaults::build::destination")]
    #[educe(Default = defaults::build::destination())]
    pub destination: PathBuf,

    /// Layout templates directory.
    #[serde(default = "defaults::build::layouts_dir")]
    #[educe(Default = defaults::build::layouts_dir())]
    pub layouts_dir: String,

    /// Partial templates directory.
    #[serde(default = "defaults::build::includes_dir")]
    #[educe(Default = defaults::build::includes_dir())]
    pub includes_dir: String,

    /// Data files directory (YAML, JSON, TOML).
    #[serde(default = "defaults::build::data_dir")]
    #[educe(Default = defaults::build::data_dir())]
    pub data_dir: String,

    /// Dated posts directory.
    #[serde(default = "defaults::build::posts_dir")]
    #[educe(Default = defaults::build::posts_dir())]
    pub posts_dir: String,

    /// Unpublished drafts directory, read only with `drafts = true`.
    #[serde(default = "defaults::build::drafts_dir")]
    #[educe(Default = defaults::build::drafts_dir())]
    pub drafts_dir: String,

    /// Incremental build cache directory.
    #[serde(default = "defaults::build::cache_dir")]
    #[educe(Default = defaults::build::cache_dir())]
    pub cache_dir: String,

    /// Post permalink style or pattern.
    #[serde(default)]
    pub permalink: PermalinkStyle,

    /// Extensions converted by the Markdown converter.
    #[serde(default = "defaults::build::markdown_ext")]
    #[educe(Default = defaults::build::markdown_ext())]
    pub markdown_ext: Vec<String>,

    /// Destination paths preserved when cleaning.
    #[serde(default = "defaults::build::keep_files")]
    #[educe(Default = defaults::build::keep_files())]
    pub keep_files: Vec<String>,

    /// Source paths (exact, directory prefix or glob) left out of the build.
    #[serde(default = "defaults::build::exclude")]
    #[educe(Default = defaults::build::exclude())]
    pub exclude: Vec<String>,

    /// Hidden paths (dotfiles, `#`/`~` files) forced into the build.
    #[serde(default)]
    pub include: Vec<String>,

    /// Render drafts and unpublished documents.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub drafts: bool,

    /// Render posts dated in the future.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub future: bool,

    /// Clean the destination before a full build.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub clean: bool,

    /// Only re-render what changed since the last build.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub incremental: bool,

    /// URL slugification mode.
    #[serde(default)]
    pub slug: SlugMode,

    /// Fail rendering on undefined template variables.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub strict_variables: bool,
}

impl BuildConfig {
    /// Whether `ext` (without dot) is a Markdown extension.
    pub fn is_markdown_ext(&self, ext: &str) -> bool {
        self.markdown_ext.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.destination, PathBuf::from("_site"));
        assert_eq!(config.build.layouts_dir, "_layouts");
        assert_eq!(config.build.posts_dir, "_posts");
        assert_eq!(config.build.cache_dir, ".kiln-cache");
        assert_eq!(config.build.permalink, PermalinkStyle::Date);
        assert_eq!(config.build.keep_files, vec![".git", ".svn"]);
        assert!(config.build.clean);
        assert!(!config.build.incremental);
        assert!(!config.build.drafts);
        assert_eq!(config.build.slug, SlugMode::Safe);
    }

    #[test]
    fn test_build_config_full() {
        let config = r#"
            [build]
            destination = "public"
            permalink = "pretty"
            markdown_ext = ["md"]
            keep_files = ["CNAME"]
            exclude = ["README.md"]
            include = [".well-known"]
            drafts = true
            future = true
            clean = false
            incremental = true
            slug = "on"
            strict_variables = true
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.build.destination, PathBuf::from("public"));
        assert_eq!(config.build.permalink, PermalinkStyle::Pretty);
        assert!(config.build.is_markdown_ext("MD"));
        assert!(!config.build.is_markdown_ext("markdown"));
        assert_eq!(config.build.include, vec![".well-known"]);
        assert!(config.build.incremental);
        assert_eq!(config.build.slug, SlugMode::On);
        assert!(config.build.strict_variables);
    }

    #[test]
    fn test_permalink_style_named_and_custom() {
        assert_eq!(PermalinkStyle::from("ordinal".to_string()), PermalinkStyle::Ordinal);
        assert_eq!(PermalinkStyle::from("none".to_string()), PermalinkStyle::None);

        let custom = PermalinkStyle::from("/blog/:title/".to_string());
        assert_eq!(custom.pattern(), "/blog/:title/");
        assert_eq!(String::from(custom), "/blog/:title/");
    }

    #[test]
    fn test_permalink_style_patterns() {
        assert_eq!(
            PermalinkStyle::Date.pattern(),
            "/:categories/:year/:month/:day/:title.html"
        );
        assert!(PermalinkStyle::Pretty.pattern().ends_with('/'));
        assert_eq!(PermalinkStyle::None.pattern(), "/:title.html");
    }

    #[test]
    fn test_slug_mode_from_toml() {
        let config = r#"
            [build]
            slug = "no"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();
        assert_eq!(config.build.slug, SlugMode::No);

        let invalid = r#"
            [build]
            slug = "sometimes"
        "#;
        assert!(toml::from_str::<SiteConfig>(invalid).is_err());
    }
}
