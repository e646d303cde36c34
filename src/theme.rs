//! Theme discovery and site-over-theme name resolution.
//!
//! Layouts, includes and data files are looked up in an ordered list of
//! search roots: the site's directory first, the active theme's second.
//! Every logical name is checked with [`is_safe_name`] before the
//! filesystem is touched, so `../x`, `/etc/passwd` or `C:\x` fail closed.
//!
//! # Theme layout
//!
//! ```text
//! _themes/minimal/
//! ├── theme.toml       # name, version, author
//! ├── _config.toml     # default configuration, merged under the site's
//! ├── _layouts/
//! ├── _includes/
//! ├── _data/
//! └── assets/          # copied to <destination>/assets/
//! ```

use crate::{
    config::{SiteConfig, ThemeSection},
    content::StaticFile,
    debug,
    error::ThemeError,
    log,
    utils::path::{is_safe_name, normalize_path},
};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Site-local theme directory.
pub const THEMES_DIR: &str = "_themes";
/// Per-user installed themes.
pub const USER_THEMES_DIR: &str = "~/.kiln/themes";
/// Theme manifest file name.
pub const MANIFEST_FILE: &str = "theme.toml";

const LAYOUT_EXTENSIONS: &[&str] = &["html", "htm"];
const DATA_EXTENSIONS: &[&str] = &["yml", "yaml", "json", "toml"];

// ============================================================================
// Theme discovery
// ============================================================================

/// Locate the theme directory selected by `[theme]`.
///
/// Returns `Ok(None)` when no theme is configured.
pub fn find_theme_root(source: &Path, section: &ThemeSection) -> Result<Option<PathBuf>, ThemeError> {
    if let Some(path) = &section.path {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        let root = if expanded.is_relative() {
            source.join(expanded)
        } else {
            expanded
        };
        return if root.is_dir() {
            Ok(Some(normalize_path(&root)))
        } else {
            Err(ThemeError::NotFound(path.display().to_string()))
        };
    }

    let Some(name) = &section.name else {
        return Ok(None);
    };
    if !is_safe_name(name) || name.contains(['/', '\\']) {
        return Err(ThemeError::UnsafeName(name.clone()));
    }

    let user_dir = PathBuf::from(shellexpand::tilde(USER_THEMES_DIR).into_owned());
    [source.join(THEMES_DIR), user_dir]
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
        .map(|root| Some(normalize_path(&root)))
        .ok_or_else(|| ThemeError::NotFound(name.clone()))
}

/// `theme.toml` contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThemeMetadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

/// A resolved theme directory.
#[derive(Debug, Clone)]
pub struct ThemeConfig {
    pub root: PathBuf,
    pub layouts_dir: PathBuf,
    pub includes_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub data_dir: PathBuf,
    pub metadata: Option<ThemeMetadata>,
}

impl ThemeConfig {
    /// Read a theme rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, ThemeError> {
        let metadata = read_toml::<ThemeMetadata>(&root.join(MANIFEST_FILE))?;

        Ok(Self {
            root: root.to_path_buf(),
            layouts_dir: root.join("_layouts"),
            includes_dir: root.join("_includes"),
            assets_dir: root.join("assets"),
            data_dir: root.join("_data"),
            metadata,
        })
    }

    /// Display name: manifest name, else the directory name.
    pub fn name(&self) -> String {
        self.metadata.as_ref().map_or_else(
            || {
                self.root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            },
            |m| m.name.clone(),
        )
    }
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ThemeError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|_| ThemeError::NotFound(path.display().to_string()))?;
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ThemeError::Manifest {
            path: path.to_path_buf(),
            source,
        })
}

// ============================================================================
// ThemeManager
// ============================================================================

/// Resolves logical names across the site and the active theme.
#[derive(Debug, Clone)]
pub struct ThemeManager {
    site_layouts: PathBuf,
    site_includes: PathBuf,
    site_data: PathBuf,
    theme: Option<ThemeConfig>,
}

impl ThemeManager {
    pub fn new(config: &SiteConfig) -> Result<Self, ThemeError> {
        let root = if config.theme.is_enabled() {
            find_theme_root(&config.source, &config.theme)?
        } else {
            None
        };
        let theme = match root {
            Some(root) => {
                let theme = ThemeConfig::load(&root)?;
                log!("theme"; "using {} ({})", theme.name(), root.display());
                if let Some(meta) = &theme.metadata {
                    debug!(
                        "theme";
                        "version {}, by {}",
                        meta.version.as_deref().unwrap_or("unknown"),
                        meta.author.as_deref().unwrap_or("unknown")
                    );
                }
                Some(theme)
            }
            None => None,
        };

        Ok(Self {
            site_layouts: config.source_dir(&config.build.layouts_dir),
            site_includes: config.source_dir(&config.build.includes_dir),
            site_data: config.source_dir(&config.build.data_dir),
            theme,
        })
    }

    pub fn theme(&self) -> Option<&ThemeConfig> {
        self.theme.as_ref()
    }

    // ========================================================================
    // Search roots
    // ========================================================================

    /// Existing layout directories, site first.
    pub fn get_layout_directories(&self) -> Vec<PathBuf> {
        self.existing(&self.site_layouts, |t| &t.layouts_dir)
    }

    /// Existing include directories, site first.
    pub fn get_include_directories(&self) -> Vec<PathBuf> {
        self.existing(&self.site_includes, |t| &t.includes_dir)
    }

    /// Existing data directories, site first.
    pub fn get_data_directories(&self) -> Vec<PathBuf> {
        self.existing(&self.site_data, |t| &t.data_dir)
    }

    fn existing(&self, site: &Path, theme: impl Fn(&ThemeConfig) -> &PathBuf) -> Vec<PathBuf> {
        std::iter::once(site.to_path_buf())
            .chain(self.theme.as_ref().map(|t| theme(t).clone()))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve a layout name (`default`, `post.html`) to a file.
    pub fn resolve_layout(&self, name: &str) -> Result<Option<PathBuf>, ThemeError> {
        resolve(&self.get_layout_directories(), name, LAYOUT_EXTENSIONS)
    }

    /// Resolve an include path (`nav.html`, `partials/footer.html`) to a file.
    pub fn resolve_include(&self, name: &str) -> Result<Option<PathBuf>, ThemeError> {
        resolve(&self.get_include_directories(), name, &[])
    }

    /// Resolve a data file name (`authors`, `nav/main.yml`) to a file.
    pub fn resolve_data_file(&self, name: &str) -> Result<Option<PathBuf>, ThemeError> {
        resolve(&self.get_data_directories(), name, DATA_EXTENSIONS)
    }

    // ========================================================================
    // Theme assets
    // ========================================================================

    /// Theme assets to copy, minus every relative path the site defines.
    ///
    /// `site_paths` holds the site's static-file relative paths.
    pub fn theme_files_to_copy(&self, site_paths: &FxHashSet<String>) -> Vec<StaticFile> {
        let Some(theme) = &self.theme else {
            return Vec::new();
        };
        if !theme.assets_dir.is_dir() {
            return Vec::new();
        }

        WalkDir::new(&theme.assets_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| match StaticFile::new(e.path(), &theme.root) {
                Ok(file) => Some(file),
                Err(err) => {
                    log!("warn"; "skipping theme asset: {err}");
                    None
                }
            })
            .filter(|file| {
                let overridden = site_paths.contains(&file.relative_path);
                if overridden {
                    debug!("theme"; "site overrides {}", file.relative_path);
                }
                !overridden
            })
            .collect()
    }
}

/// Look `name` up in each directory in order, trying bare `name` first and
/// then `name.<ext>` for extensionless names.
fn resolve(dirs: &[PathBuf], name: &str, extensions: &[&str]) -> Result<Option<PathBuf>, ThemeError> {
    if !is_safe_name(name) {
        return Err(ThemeError::UnsafeName(name.to_owned()));
    }

    let has_extension = Path::new(name).extension().is_some();
    for dir in dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
        if has_extension {
            continue;
        }
        for ext in extensions {
            let candidate = dir.join(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}
