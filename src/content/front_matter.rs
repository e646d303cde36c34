//! Front matter detection and parsing.
//!
//! A front matter block is YAML between two `---` lines at the top of a
//! file:
//!
//! ```text
//! ---
//! title: Hello
//! categories: [rust, notes]
//! ---
//! Body starts here.
//! ```

use crate::error::ContentError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

/// Bytes inspected when deciding whether a file is a template document.
pub const DETECTION_WINDOW: usize = 4096;

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

// ============================================================================
// Detection
// ============================================================================

/// Check whether the file at `path` starts with a front matter block.
///
/// Only the first [`DETECTION_WINDOW`] bytes are read.
pub fn has_front_matter(path: &Path) -> io::Result<bool> {
    let mut buf = Vec::with_capacity(DETECTION_WINDOW);
    File::open(path)?
        .take(DETECTION_WINDOW as u64)
        .read_to_end(&mut buf)?;
    Ok(detect(&buf))
}

/// Front matter detection over an initial window of bytes.
pub fn detect(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.trim_start_matches(BOM).trim_start().lines();
    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return false,
    }
    lines.any(|line| line.trim_end() == DELIMITER)
}

/// Split content into `(yaml, body)` when it starts with front matter.
///
/// Delimiter lines are matched the same way as in [`detect`].
pub fn split(content: &str) -> Option<(&str, &str)> {
    let text = content.trim_start_matches(BOM).trim_start();
    let first = text.split_inclusive('\n').next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }
    let rest = &text[first.len()..];

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parse the YAML block of the file at `path` into a key/value map.
pub fn parse_yaml(yaml: &str, path: &Path) -> Result<Map<String, Value>, ContentError> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_yaml::from_str(yaml).map_err(|source| ContentError::FrontMatter {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ContentError::FrontMatterShape {
            path: path.to_path_buf(),
            message: format!("expected a mapping, found {}", kind_name(&other)),
        }),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

// ============================================================================
// FrontMatter
// ============================================================================

/// Typed front matter: well-known keys plus an open map for the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontMatter {
    pub title: Option<String>,
    /// Raw date string; parsed into the document's effective date.
    pub date: Option<String>,
    pub permalink: Option<String>,
    pub layout: Option<String>,
    pub collection: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub published: bool,
    pub draft: bool,
    pub slug: Option<String>,
    /// Every key not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            title: None,
            date: None,
            permalink: None,
            layout: None,
            collection: None,
            categories: Vec::new(),
            tags: Vec::new(),
            published: true,
            draft: false,
            slug: None,
            extra: Map::new(),
        }
    }
}

impl FrontMatter {
    /// Build typed front matter from a parsed map.
    ///
    /// `categories`/`tags` accept a scalar (one entry) or a list; the
    /// singular `category`/`tag` keys additionally split a scalar on
    /// whitespace. Both forms are merged, duplicates dropped.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, String> {
        let mut fm = Self {
            title: take_string(&mut map, "title")?,
            date: take_string(&mut map, "date")?,
            permalink: take_string(&mut map, "permalink")?,
            layout: take_string(&mut map, "layout")?.filter(|l| !l.is_empty() && l != "none"),
            collection: take_string(&mut map, "collection")?,
            slug: take_string(&mut map, "slug")?,
            ..Self::default()
        };

        fm.categories = take_terms(&mut map, "categories", "category")?;
        fm.tags = take_terms(&mut map, "tags", "tag")?;

        if let Some(published) = take_bool(&mut map, "published")? {
            fm.published = published;
        }
        if let Some(draft) = take_bool(&mut map, "draft")? {
            fm.draft = draft;
        }

        fm.extra = map;
        Ok(fm)
    }

    /// Look up any key, known or extra, as a JSON value.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "title" => self.title.clone().map(Value::String),
            "date" => self.date.clone().map(Value::String),
            "permalink" => self.permalink.clone().map(Value::String),
            "layout" => self.layout.clone().map(Value::String),
            "slug" => self.slug.clone().map(Value::String),
            _ => self.extra.get(key).cloned(),
        }
    }
}

/// Remove `key` and return it as a string; scalars are stringified.
fn take_string(map: &mut Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(format!("`{key}` must be a string, found {}", kind_name(&other))),
    }
}

fn take_bool(map: &mut Map<String, Value>, key: &str) -> Result<Option<bool>, String> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(other) => Err(format!("`{key}` must be a boolean, found {}", kind_name(&other))),
    }
}

/// Collect `plural` then `singular` terms into one ordered, de-duplicated list.
fn take_terms(
    map: &mut Map<String, Value>,
    plural: &str,
    singular: &str,
) -> Result<Vec<String>, String> {
    let mut terms = Vec::new();
    if let Some(value) = map.remove(plural) {
        collect_terms(plural, value, false, &mut terms)?;
    }
    if let Some(value) = map.remove(singular) {
        collect_terms(singular, value, true, &mut terms)?;
    }

    let mut seen = rustc_hash::FxHashSet::default();
    terms.retain(|t| seen.insert(t.clone()));
    Ok(terms)
}

fn collect_terms(
    key: &str,
    value: Value,
    split_scalar: bool,
    out: &mut Vec<String>,
) -> Result<(), String> {
    let push_scalar = |s: String, out: &mut Vec<String>| {
        if split_scalar {
            out.extend(s.split_whitespace().map(String::from));
        } else if !s.trim().is_empty() {
            out.push(s.trim().to_owned());
        }
    };

    match value {
        Value::Null => {}
        Value::String(s) => push_scalar(s, out),
        Value::Number(n) => push_scalar(n.to_string(), out),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_owned()),
                    Value::Number(n) => out.push(n.to_string()),
                    Value::String(_) | Value::Null => {}
                    other => {
                        return Err(format!(
                            "`{key}` entries must be strings, found {}",
                            kind_name(&other)
                        ));
                    }
                }
            }
        }
        other => {
            return Err(format!(
                "`{key}` must be a string or a list, found {}",
                kind_name(&other)
            ));
        }
    }
    Ok(())
}
