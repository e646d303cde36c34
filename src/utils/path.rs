//! Path safety and normalization helpers.
//!
//! Every logical name that reaches the filesystem (layout, include, data
//! file, theme name, permalink, request URL) passes through one of these
//! functions first.
//!
//! | Function             | Policy                                         |
//! |----------------------|------------------------------------------------|
//! | [`is_safe_name`]     | reject `..`, absolute paths, drive letters     |
//! | [`collapse_url`]     | neutralize `..`/`.` segments, never reject     |
//! | [`is_within`]        | lexical containment check against a root       |

use std::{
    env,
    path::{Component, Path, PathBuf},
};

/// Check whether a logical name is safe to join under a search root.
///
/// Rejects (before any filesystem access):
/// - empty names
/// - `..` segments, using either `/` or `\` as separator
/// - absolute paths (`/etc`, `\\server`)
/// - drive-letter prefixes (`C:foo`, `c:\foo`)
/// - embedded NUL bytes
pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name.contains('\0') {
        return false;
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return false;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    !name.split(['/', '\\']).any(|segment| segment == "..")
}

/// Collapse a URL path into a clean, rooted form.
///
/// Backslashes count as separators, `.` and empty segments are dropped and
/// `..` pops the previous segment but never climbs above the root. A
/// trailing slash is kept so "pretty" URLs stay directory-shaped.
///
/// `/a/../../etc/passwd` → `/etc/passwd`, `` → `/`, `/blog/` → `/blog/`
pub fn collapse_url(url: &str) -> String {
    let url = url.replace('\\', "/").replace('\0', "");
    let trailing = url.ends_with('/') || url.ends_with("/.") || url.ends_with("/..");

    let mut segments: Vec<&str> = Vec::new();
    for segment in url.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_owned();
    }

    let mut out = String::with_capacity(url.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if trailing {
        out.push('/');
    }
    out
}

/// Lexically normalize a path without touching the filesystem.
///
/// `..` pops a normal component; at the root it is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check that `path` stays inside `root` after lexical normalization.
pub fn is_within(root: &Path, path: &Path) -> bool {
    let root = normalize_lexically(root);
    let path = normalize_lexically(path);
    path.starts_with(&root)
}

/// Render a relative path with forward slashes on every platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a path to absolute form for reliable comparison.
///
/// Existing paths are canonicalized; missing ones are joined with the
/// current directory.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            env::current_dir()
                .map_or_else(|_| path.to_path_buf(), |cwd| normalize_lexically(&cwd.join(path)))
        }
    })
}
