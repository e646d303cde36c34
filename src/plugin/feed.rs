//! RSS feed generation.
//!
//! Emits the newest visible posts as an RSS 2.0 channel. Requires
//! `[site] url`, since feed links must be absolute.

use super::{GeneratedFile, Generator, GeneratorOutput};
use crate::{
    content::Document,
    render::converter::markdown_to_html,
    site::Site,
    utils::date::to_rfc2822,
};
use anyhow::{Result, anyhow, bail};
use pulldown_cmark::Options;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder, validation::Validate};

/// Writes the feed to `[plugins] feed_path`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedGenerator;

impl Generator for FeedGenerator {
    fn name(&self) -> &str {
        "feed"
    }

    fn generate(&self, site: &Site) -> Result<GeneratorOutput> {
        let config = &site.config;
        if config.site.url.is_empty() {
            bail!("[site] url is required for the feed");
        }
        let base = config.site_url();

        let items: Vec<rss::Item> = site
            .visible_posts()
            .rev()
            .take(config.plugins.feed_limit)
            .map(|post| post_to_item(post, &base, &site.config.site.author))
            .collect();

        let channel = ChannelBuilder::default()
            .title(config.site.title.clone())
            .link(format!("{base}/"))
            .description(config.site.description.clone())
            .language(Some(config.site.language.clone()))
            .generator(Some(format!("kiln {}", env!("CARGO_PKG_VERSION"))))
            .items(items)
            .build();

        channel
            .validate()
            .map_err(|e| anyhow!("rss validation failed: {e}"))?;

        Ok(GeneratorOutput {
            files: vec![GeneratedFile::new(
                config.plugins.feed_path.trim_start_matches('/'),
                channel.to_string(),
            )],
            documents: Vec::new(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn post_to_item(post: &Document, base: &str, site_author: &str) -> rss::Item {
    let link = format!("{base}{}", post.url);
    let author = post
        .front_matter
        .extra
        .get("author")
        .and_then(|a| a.as_str())
        .map(str::to_owned)
        .or_else(|| (!site_author.is_empty()).then(|| site_author.to_owned()));
    let categories = post
        .front_matter
        .categories
        .iter()
        .chain(&post.front_matter.tags)
        .map(|name| CategoryBuilder::default().name(name.clone()).build())
        .collect::<Vec<_>>();

    ItemBuilder::default()
        .title(Some(post.title().to_owned()))
        .link(Some(link.clone()))
        .guid(Some(GuidBuilder::default().permalink(true).value(link).build()))
        .description(Some(excerpt(post)))
        .pub_date(Some(to_rfc2822(&post.date)))
        .author(author)
        .categories(categories)
        .build()
}

/// `excerpt` or `description` front matter, else the first paragraph of
/// the body as HTML.
fn excerpt(post: &Document) -> String {
    for key in ["excerpt", "description"] {
        if let Some(text) = post.front_matter.extra.get(key).and_then(|v| v.as_str()) {
            return text.to_owned();
        }
    }
    let first = post
        .content
        .trim_start()
        .split("\n\n")
        .next()
        .unwrap_or_default();
    markdown_to_html(first, Options::empty()).trim_end().to_owned()
}
