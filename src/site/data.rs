//! `_data` loading.
//!
//! Each file becomes a key path: `_data/nav/main.yml` → `site.data.nav.main`.
//! Names are collected across the theme and site data directories and each
//! one is resolved through the theme manager, so a site file replaces the
//! theme file with the same name while the theme's other files survive.

use crate::{error::ContentError, log, theme::ThemeManager, utils::path::to_slash};
use serde_json::{Map, Value};
use std::{collections::BTreeSet, fs, path::Path};
use walkdir::WalkDir;

const DATA_EXTENSIONS: &[&str] = &["yml", "yaml", "json", "toml"];

/// Load the merged data tree. Unreadable files are logged and skipped.
pub fn load_data(themes: &ThemeManager) -> Value {
    let mut names = BTreeSet::new();
    for dir in themes.get_data_directories() {
        names.extend(data_names(&dir));
    }

    let mut root = Map::new();
    for name in names {
        let path = match themes.resolve_data_file(&name) {
            Ok(Some(path)) => path,
            Ok(None) => continue,
            Err(err) => {
                log!("warn"; "{err}");
                continue;
            }
        };
        match parse_data_file(&path) {
            Ok(value) => insert_nested(&mut root, &name, value),
            Err(err) => log!("warn"; "{:#}", anyhow::Error::new(err)),
        }
    }
    Value::Object(root)
}

/// Logical names (relative path without extension) of data files in `dir`.
fn data_names(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .filter_map(|e| {
            let relative = e.path().strip_prefix(dir).ok()?.with_extension("");
            Some(to_slash(&relative))
        })
        .collect()
}

/// Parse one YAML, JSON or TOML data file.
pub fn parse_data_file(path: &Path) -> Result<Value, ContentError> {
    let content = fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data_err = |message: String| ContentError::Data {
        path: path.to_path_buf(),
        message,
    };

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| data_err(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| data_err(e.to_string())),
        "toml" => toml::from_str::<toml::Table>(&content)
            .map_err(|e| data_err(e.to_string()))
            .and_then(|table| serde_json::to_value(table).map_err(|e| data_err(e.to_string()))),
        other => Err(data_err(format!("unsupported data format `{other}`"))),
    }
}

/// Insert `value` at the `/`-separated key path `name`.
fn insert_nested(root: &mut Map<String, Value>, name: &str, value: Value) {
    let mut segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.to_owned(), value);
}
