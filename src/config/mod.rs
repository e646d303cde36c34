//! Site configuration management for `_config.toml`.
//!
//! # Sections
//!
//! | Section           | Purpose                                          |
//! |-------------------|--------------------------------------------------|
//! | `[site]`          | Site metadata (title, url, baseurl, author)      |
//! | `[build]`         | Directories, permalink style, build-mode flags   |
//! | `[collections.*]` | User-defined document groups                     |
//! | `[[defaults]]`    | Scoped front-matter defaults                     |
//! | `[theme]`         | Theme name or path                               |
//! | `[serve]`         | Development server (ports, watch, live reload)   |
//! | `[plugins]`       | Built-in generators (sitemap, feed)              |
//! | `[extra]`         | User-defined fields exposed as `site.<key>`      |
//!
//! # Example
//!
//! ```toml
//! [site]
//! title = "My Blog"
//! url = "https://example.com"
//!
//! [build]
//! permalink = "pretty"
//!
//! [collections.recipes]
//! output = true
//!
//! [theme]
//! name = "minimal"
//!
//! [extra]
//! analytics_id = "UA-12345"
//! ```
//!
//! A theme may ship its own `_config.toml`; it is merged *under* the site's
//! table, so every key the site sets wins.

mod build;
mod content;
pub mod defaults;
mod error;
mod plugins;
mod serve;
mod site;

pub use build::{BuildConfig, PermalinkStyle, SlugMode};
pub use content::{CollectionConfig, Collections, FrontMatterDefault};
pub use error::ConfigError;
pub use plugins::{PluginsConfig, ThemeSection};
pub use serve::ServeConfig;
pub use site::SiteSection;

use crate::{
    cli::{Cli, Commands},
    utils::path::{is_safe_name, normalize_path},
};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name inside the source root.
pub const CONFIG_FILE: &str = "_config.toml";

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing _config.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute source root (set after loading)
    #[serde(skip)]
    pub source: PathBuf,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Basic site information
    #[serde(default)]
    pub site: SiteSection,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// User-defined collections, in declaration order
    #[serde(default)]
    pub collections: Collections,

    /// Scoped front-matter defaults
    #[serde(default)]
    pub defaults: Vec<FrontMatterDefault>,

    /// Theme selection
    #[serde(default)]
    pub theme: ThemeSection,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Built-in generators
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: toml::Table,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `<source>/<config_name>`, merge the theme overlay and validate.
    ///
    /// A missing config file yields the default configuration.
    pub fn load(source: &Path, config_name: &Path) -> Result<Self, ConfigError> {
        let source = normalize_path(source);
        let config_path = source.join(config_name);
        let mut table = read_table(&config_path)?;

        let theme: ThemeSection = match table.get("theme") {
            Some(value) => value.clone().try_into()?,
            None => ThemeSection::default(),
        };
        validate_theme(&theme)?;

        if let Ok(Some(theme_root)) = crate::theme::find_theme_root(&source, &theme) {
            let overlay_path = theme_root.join(CONFIG_FILE);
            if overlay_path.is_file() {
                let mut overlay = read_table(&overlay_path)?;
                overlay.remove("theme");
                deep_merge(&mut overlay, table);
                table = overlay;
            }
        }

        let mut config: SiteConfig = toml::Value::Table(table).try_into()?;
        config.source = source;
        config.config_path = config_path;
        config.resolve_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration named by the CLI and apply its overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let source = cli.source.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::load(&source, &cli.config)?;
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        if let Some(args) = cli.build_args() {
            Self::update_option(&mut self.build.destination, args.destination.as_ref());
            Self::update_option(&mut self.build.drafts, args.drafts.as_ref());
            Self::update_option(&mut self.build.future, args.future.as_ref());
            Self::update_option(&mut self.build.clean, args.clean.as_ref());
            Self::update_option(&mut self.build.incremental, args.incremental.as_ref());
        }

        if let Commands::Serve {
            host,
            port,
            livereload_port,
            no_watch,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, host.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.livereload_port, livereload_port.as_ref());
            if *no_watch {
                self.serve.watch = false;
            }
        }

        self.resolve_paths();
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize the destination to an absolute path under the source root.
    fn resolve_paths(&mut self) {
        if self.source.as_os_str().is_empty() {
            return;
        }
        self.build.destination = normalize_path(&self.source.join(&self.build.destination));
    }

    // ========================================================================
    // Derived paths
    // ========================================================================

    /// Absolute destination root.
    pub fn destination(&self) -> &Path {
        &self.build.destination
    }

    /// Absolute path of a source-relative directory name.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.source.join(name)
    }

    /// Absolute incremental cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.source.join(&self.build.cache_dir)
    }

    /// Site URL joined with `baseurl`, without trailing slash.
    pub fn site_url(&self) -> String {
        format!(
            "{}{}",
            self.site.url.trim_end_matches('/'),
            self.site.base_path()
        )
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_theme(&self.theme)?;

        if !self.site.url.is_empty()
            && !(self.site.url.starts_with("http://") || self.site.url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(
                "[site.url] must start with http:// or https://".into(),
            ));
        }

        for collection in self.collections.iter() {
            if !is_safe_name(&collection.name) || collection.name.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "[collections.{}] is not a valid collection name",
                    collection.name
                )));
            }
            if collection.name == "posts" {
                return Err(ConfigError::Validation(
                    "[collections.posts] is reserved for the posts directory".into(),
                ));
            }
        }

        for (field, dir) in [
            ("layouts_dir", &self.build.layouts_dir),
            ("includes_dir", &self.build.includes_dir),
            ("data_dir", &self.build.data_dir),
            ("posts_dir", &self.build.posts_dir),
            ("drafts_dir", &self.build.drafts_dir),
            ("cache_dir", &self.build.cache_dir),
        ] {
            if !is_safe_name(dir) {
                return Err(ConfigError::Validation(format!(
                    "[build.{field}] must be a relative path inside the source"
                )));
            }
        }

        if !self.source.as_os_str().is_empty() && self.source.starts_with(&self.build.destination) {
            return Err(ConfigError::Validation(
                "[build.destination] must not contain the source directory".into(),
            ));
        }

        if self.serve.port == self.serve.livereload_port {
            return Err(ConfigError::Validation(
                "[serve.port] and [serve.livereload_port] must differ".into(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Theme identity follows the same rules as resolved names.
fn validate_theme(theme: &ThemeSection) -> Result<(), ConfigError> {
    if let Some(name) = &theme.name
        && (!is_safe_name(name) || name.contains(['/', '\\']))
    {
        return Err(ConfigError::Validation(format!(
            "[theme.name] `{name}` is not a valid theme name"
        )));
    }
    Ok(())
}

/// Read a TOML file into a table; a missing file is an empty table.
fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    if !path.exists() {
        return Ok(toml::Table::new());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Recursively merge `overlay` into `base`; overlay values win.
pub fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
