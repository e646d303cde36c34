//! Source tree entry filtering.
//!
//! Decides which paths under the source root take part in the page and
//! static-file walk:
//!
//! | Entry                          | Default  | With `include` match |
//! |--------------------------------|----------|----------------------|
//! | `_special` (leading `_`)       | skipped  | kept                 |
//! | `.hidden`, `#tmp`, `~x`, `x~`  | skipped  | kept                 |
//! | `exclude` match                | skipped  | skipped              |
//! | destination / cache directory  | skipped  | skipped              |

use crate::config::SiteConfig;
use glob::Pattern;
use std::path::{Path, PathBuf};

/// Compiled exclude/include rules for one build.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    exclude: Vec<Rule>,
    include: Vec<Rule>,
    skip_dirs: Vec<PathBuf>,
}

/// One exclude/include entry: exact path, directory prefix or glob.
#[derive(Debug, Clone)]
struct Rule {
    literal: String,
    glob: Option<Pattern>,
}

impl Rule {
    fn new(raw: &str) -> Self {
        let literal = raw.trim_matches('/').to_owned();
        let glob = if literal.contains(['*', '?', '[']) {
            Pattern::new(&literal).ok()
        } else {
            None
        };
        Self { literal, glob }
    }

    /// Match a source-relative path by exact path, directory prefix, glob,
    /// or bare file name.
    fn matches(&self, relative: &str) -> bool {
        if self.literal.is_empty() {
            return false;
        }
        if let Some(glob) = &self.glob {
            let name = relative.rsplit('/').next().unwrap_or(relative);
            return glob.matches(relative) || glob.matches(name);
        }
        relative == self.literal
            || relative
                .strip_prefix(&self.literal)
                .is_some_and(|rest| rest.starts_with('/'))
            || (!self.literal.contains('/')
                && relative.rsplit('/').next() == Some(self.literal.as_str()))
    }
}

impl EntryFilter {
    pub fn new(config: &SiteConfig) -> Self {
        let mut skip_dirs = vec![config.destination().to_path_buf(), config.cache_dir()];
        skip_dirs.retain(|dir| !dir.as_os_str().is_empty());

        Self {
            exclude: config.build.exclude.iter().map(|r| Rule::new(r)).collect(),
            include: config.build.include.iter().map(|r| Rule::new(r)).collect(),
            skip_dirs,
        }
    }

    /// Whether `relative` matches an exclude rule.
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.exclude.iter().any(|rule| rule.matches(relative))
    }

    /// Whether `relative` matches an include rule.
    pub fn is_included(&self, relative: &str) -> bool {
        self.include.iter().any(|rule| rule.matches(relative))
    }

    /// Decide whether an entry is walked. `path` is absolute, `relative`
    /// is its source-relative form.
    pub fn allows(&self, path: &Path, relative: &str) -> bool {
        if self.skip_dirs.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        if self.is_excluded(relative) {
            return false;
        }
        let name = relative.rsplit('/').next().unwrap_or(relative);
        if is_special(name) || is_hidden(name) {
            return self.is_included(relative);
        }
        true
    }
}

/// `_layouts`, `_posts`, `_config.toml`: reserved for the build itself.
pub fn is_special(name: &str) -> bool {
    name.starts_with('_')
}

/// Dotfiles and editor temp/backup files.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('#') || name.starts_with('~') || name.ends_with('~')
}
