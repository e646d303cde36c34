//! `[theme]` and `[plugins]` sections.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[theme]` section - which theme the site adopts.
///
/// `name` is looked up under `_themes/<name>` in the source root, then
/// `~/.kiln/themes/<name>`; `path` points at a theme directory directly.
///
/// # Example
/// ```toml
/// [theme]
/// name = "minimal"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeSection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl ThemeSection {
    pub fn is_enabled(&self) -> bool {
        self.name.is_some() || self.path.is_some()
    }
}

/// `[plugins]` section - built-in output generators.
///
/// # Example
/// ```toml
/// [plugins]
/// sitemap = true
/// feed = true
/// feed_limit = 20
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PluginsConfig {
    /// Generate `sitemap.xml`.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub sitemap: bool,

    /// Generate an RSS 2.0 feed of posts.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub feed: bool,

    /// Feed path relative to the destination.
    #[serde(default = "defaults::plugins::feed_path")]
    #[educe(Default = defaults::plugins::feed_path())]
    pub feed_path: String,

    /// Maximum number of posts in the feed.
    #[serde(default = "defaults::plugins::feed_limit")]
    #[educe(Default = defaults::plugins::feed_limit())]
    pub feed_limit: usize,
}
