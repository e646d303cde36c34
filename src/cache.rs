//! Incremental build ledger.
//!
//! Records, per rendered document, the source mtime and the files it was
//! built from (layout chain, includes). Persisted as JSON inside the cache
//! directory:
//!
//! ```json
//! {
//!   "version": 1,
//!   "lastBuild": 1718000000000,
//!   "configMtime": 1717999999123.0,
//!   "files": {
//!     "_posts/2024-01-15-hello.md": {
//!       "path": "_posts/2024-01-15-hello.md",
//!       "mtime": 1717999000000.0,
//!       "dependencies": ["_layouts/post.html", "_layouts/default.html"]
//!     }
//!   }
//! }
//! ```
//!
//! Keys are source-relative for files inside the source root and absolute
//! for theme files. The whole ledger is dropped when its version differs
//! or the config file changed since the last build.

use crate::{config::SiteConfig, debug, log};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Ledger format version; bump on any incompatible change.
pub const CACHE_VERSION: u32 = 1;

/// Ledger file name inside the cache directory.
pub const CACHE_FILE: &str = "build-cache.json";

/// Mtime differences at or below this many milliseconds are jitter.
const MTIME_EPSILON_MS: f64 = 1.0;

// ============================================================================
// Persisted types
// ============================================================================

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub path: String,
    /// Epoch milliseconds.
    pub mtime: f64,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The whole persisted ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub version: u32,
    /// Epoch milliseconds of the last save.
    pub last_build: u64,
    pub config_mtime: Option<f64>,
    #[serde(default)]
    pub files: BTreeMap<String, CacheEntry>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            last_build: 0,
            config_mtime: None,
            files: BTreeMap::new(),
        }
    }
}

// ============================================================================
// CacheManager
// ============================================================================

/// Owns the ledger for one build. Not shared between builders.
#[derive(Debug)]
pub struct CacheManager {
    source: PathBuf,
    cache_file: PathBuf,
    metadata: CacheMetadata,
}

impl CacheManager {
    /// Load the ledger for `config`, falling back to an empty one.
    ///
    /// Never fails: unreadable, corrupt or outdated ledgers are discarded.
    pub fn load(config: &SiteConfig) -> Self {
        let cache_file = config.cache_dir().join(CACHE_FILE);
        let mut metadata = read_metadata(&cache_file).unwrap_or_default();

        if metadata.version != CACHE_VERSION {
            debug!("cache"; "version {} != {}, starting fresh", metadata.version, CACHE_VERSION);
            metadata = CacheMetadata::default();
        }

        let config_mtime = mtime_millis(&config.config_path);
        if !same_mtime(metadata.config_mtime, config_mtime) {
            if !metadata.files.is_empty() {
                log!("cache"; "config changed, full rebuild");
            }
            metadata.files.clear();
        }
        metadata.config_mtime = config_mtime;

        Self {
            source: config.source.clone(),
            cache_file,
            metadata,
        }
    }

    /// Absent from the ledger, gone from disk, or mtime moved.
    pub fn has_changed(&self, key: &str) -> bool {
        let Some(entry) = self.metadata.files.get(key) else {
            return true;
        };
        match mtime_millis(&self.resolve(key)) {
            Some(current) => !same_mtime(Some(entry.mtime), Some(current)),
            None => true,
        }
    }

    /// Any recorded dependency of `key` has changed.
    pub fn has_dependency_changes(&self, key: &str) -> bool {
        self.metadata
            .files
            .get(key)
            .is_some_and(|entry| entry.dependencies.iter().any(|dep| self.has_changed(dep)))
    }

    /// Record `key` as freshly built from `dependencies`.
    ///
    /// Dependencies get their own entries (mtime only) so that later
    /// `has_changed` calls on them have a baseline.
    pub fn update_file(&mut self, key: &str, dependencies: Vec<String>) {
        for dep in &dependencies {
            let Some(mtime) = mtime_millis(&self.resolve(dep)) else {
                continue;
            };
            self.metadata
                .files
                .entry(dep.clone())
                .and_modify(|entry| entry.mtime = mtime)
                .or_insert_with(|| CacheEntry {
                    path: dep.clone(),
                    mtime,
                    dependencies: Vec::new(),
                });
        }

        let Some(mtime) = mtime_millis(&self.resolve(key)) else {
            return;
        };
        self.metadata.files.insert(
            key.to_owned(),
            CacheEntry {
                path: key.to_owned(),
                mtime,
                dependencies,
            },
        );
    }

    /// Drop entries whose file no longer exists.
    pub fn prune(&mut self) -> usize {
        let before = self.metadata.files.len();
        let source = self.source.clone();
        self.metadata
            .files
            .retain(|key, _| resolve_key(&source, key).exists());
        before - self.metadata.files.len()
    }

    /// Prune and persist atomically. Returns whether the ledger was written.
    ///
    /// Failures are logged and swallowed; the previous ledger stays intact.
    pub fn save(&mut self) -> bool {
        let pruned = self.prune();
        if pruned > 0 {
            debug!("cache"; "pruned {} stale entries", pruned);
        }
        self.metadata.last_build = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);

        match write_atomic(&self.cache_file, &self.metadata) {
            Ok(()) => true,
            Err(err) => {
                log!("warn"; "cache not saved: {:#}", err);
                false
            }
        }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        resolve_key(&self.source, key)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_key(source: &Path, key: &str) -> PathBuf {
    let path = Path::new(key);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        source.join(path)
    }
}

fn read_metadata(path: &Path) -> Option<CacheMetadata> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            log!("warn"; "ignoring corrupt cache {}: {}", path.display(), err);
            None
        }
    }
}

/// Write `metadata` to a sibling temp file, then rename it over `path`.
fn write_atomic(path: &Path, metadata: &CacheMetadata) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(metadata)?;
    let tmp = path.with_extension("json.tmp");

    let result = (|| -> anyhow::Result<()> {
        let mut file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        file.write_all(&json)
            .with_context(|| format!("write {}", tmp.display()))?;
        file.sync_all().ok();
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
    })();

    if result.is_err() {
        fs::remove_file(&tmp).ok();
    }
    result
}

/// Modification time as epoch milliseconds.
fn mtime_millis(path: &Path) -> Option<f64> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let duration = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(duration.as_secs_f64() * 1000.0)
}

fn same_mtime(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= MTIME_EPSILON_MS,
        (None, None) => true,
        _ => false,
    }
}
