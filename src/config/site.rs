//! `[site]` section configuration.
//!
//! Basic site information exposed to templates as `site.*`.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[site]` section in _config.toml - basic site metadata.
///
/// # Example
/// ```toml
/// [site]
/// title = "My Blog"
/// description = "Notes on Rust"
/// url = "https://example.com"
/// baseurl = "/blog"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteSection {
    /// Site title.
    #[serde(default = "defaults::site::title")]
    #[educe(Default = defaults::site::title())]
    pub title: String,

    /// Site description for feeds and meta tags.
    #[serde(default)]
    pub description: String,

    /// Scheme and host used by `absolute_url`, the sitemap and the feed.
    #[serde(default)]
    pub url: String,

    /// Path prefix for subdirectory deployment (e.g. `/blog`).
    #[serde(default)]
    pub baseurl: String,

    /// Author name for feeds.
    #[serde(default)]
    pub author: String,

    /// BCP 47 language code.
    #[serde(default = "defaults::site::language")]
    #[educe(Default = defaults::site::language())]
    pub language: String,
}

impl SiteSection {
    /// `baseurl` without trailing slash, `""` or `/prefix`.
    pub fn base_path(&self) -> String {
        let trimmed = self.baseurl.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}
