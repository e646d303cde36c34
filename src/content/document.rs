//! Parsed content documents.

use super::{
    DocumentKind,
    front_matter::{self, FrontMatter},
};
use crate::{
    config::{SiteConfig, SlugMode},
    error::ContentError,
    utils::{
        date::{self, parse_date, split_filename_date, strip_date_prefix},
        path::{is_within, to_slash},
        slug::slugify,
    },
};
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

/// A parsed content file: page, post, layout, include or collection entry.
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to its source root, with forward slashes.
    pub relative_path: String,
    /// File extension without the dot (may be empty).
    pub extension: String,
    /// File name without extension.
    pub basename: String,
    pub kind: DocumentKind,
    /// Owning collection for [`DocumentKind::Collection`] documents.
    pub collection: Option<String>,
    pub front_matter: FrontMatter,
    /// Effective date: front matter, then filename prefix (posts), then mtime.
    pub date: NaiveDateTime,
    /// URL slug derived from front matter or the basename.
    pub slug: String,
    /// Read from the drafts directory.
    pub is_draft: bool,
    /// Absolute-from-root URL, assigned by the URL engine.
    pub url: String,
    /// Raw body after the front matter block.
    pub content: String,
    /// Rendered output, filled in by the render phase.
    pub output: Option<String>,
}

impl Document {
    /// Read and parse `path`, which must live inside `root`.
    ///
    /// With a config, scoped `[[defaults]]` are applied under the file's own
    /// front matter and the configured slug mode is used.
    pub fn read(
        path: &Path,
        root: &Path,
        kind: DocumentKind,
        config: Option<&SiteConfig>,
    ) -> Result<Self, ContentError> {
        Self::load(path, root, kind, None, config)
    }

    /// Read a document belonging to collection `name`.
    pub fn read_collection(
        path: &Path,
        root: &Path,
        name: &str,
        config: Option<&SiteConfig>,
    ) -> Result<Self, ContentError> {
        Self::load(path, root, DocumentKind::Collection, Some(name), config)
    }

    fn load(
        path: &Path,
        root: &Path,
        kind: DocumentKind,
        collection: Option<&str>,
        config: Option<&SiteConfig>,
    ) -> Result<Self, ContentError> {
        let relative = relative_to_root(path, root)?;
        let io_err = |source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        };
        let raw = fs::read_to_string(path).map_err(io_err)?;
        let mtime = fs::metadata(path).and_then(|m| m.modified()).map_err(io_err)?;

        Self::parse(path, &relative, kind, collection, config, &raw, mtime)
    }

    /// Build a document from in-memory content, e.g. one produced by a generator.
    #[cfg(test)]
    pub fn from_source(
        relative_path: &str,
        root: &Path,
        kind: DocumentKind,
        raw: &str,
        config: Option<&SiteConfig>,
    ) -> Result<Self, ContentError> {
        let path = root.join(relative_path);
        let relative = relative_to_root(&path, root)?;
        Self::parse(&path, &relative, kind, None, config, raw, SystemTime::now())
    }

    fn parse(
        path: &Path,
        relative: &str,
        kind: DocumentKind,
        collection: Option<&str>,
        config: Option<&SiteConfig>,
        raw: &str,
        mtime: SystemTime,
    ) -> Result<Self, ContentError> {
        let (yaml, body) = front_matter::split(raw).unwrap_or(("", raw));
        let mut map = front_matter::parse_yaml(yaml, path)?;

        let scope_kind = kind.scope_name(collection);
        if let (Some(config), Some(scope_kind)) = (config, scope_kind) {
            apply_defaults(&mut map, config, relative, scope_kind);
        }

        let front_matter = FrontMatter::from_map(map).map_err(|message| {
            ContentError::FrontMatterShape {
                path: path.to_path_buf(),
                message,
            }
        })?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let basename = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let date = match &front_matter.date {
            Some(raw_date) => parse_date(raw_date).ok_or_else(|| ContentError::FrontMatterShape {
                path: path.to_path_buf(),
                message: format!("invalid date `{raw_date}`"),
            })?,
            None => match kind {
                DocumentKind::Post => split_filename_date(&basename)
                    .map(|(d, _)| d)
                    .unwrap_or_else(|| date::from_system_time(mtime)),
                _ => date::from_system_time(mtime),
            },
        };

        let slug_mode = config.map_or(SlugMode::Safe, |c| c.build.slug.clone());
        let slug_source = match (&front_matter.slug, kind) {
            (Some(slug), _) => slug.as_str(),
            (None, DocumentKind::Post) => strip_date_prefix(&basename),
            (None, _) => basename.as_str(),
        };
        let slug = slugify(slug_source, &slug_mode);

        let collection = collection
            .map(String::from)
            .or_else(|| front_matter.collection.clone());

        Ok(Self {
            path: path.to_path_buf(),
            relative_path: relative.to_owned(),
            extension,
            basename,
            kind,
            collection,
            front_matter,
            date,
            slug,
            is_draft: false,
            url: String::new(),
            content: body.to_owned(),
            output: None,
        })
    }

    /// Mark this document as read from the drafts directory.
    pub fn into_draft(mut self) -> Self {
        self.is_draft = true;
        self
    }

    /// Published unless front matter says otherwise or it is a draft.
    pub fn is_published(&self) -> bool {
        self.front_matter.published && !self.front_matter.draft && !self.is_draft
    }

    /// Title from front matter, else the slug.
    pub fn title(&self) -> &str {
        self.front_matter.title.as_deref().unwrap_or(&self.slug)
    }

    /// Layout named in front matter, if any.
    pub fn layout(&self) -> Option<&str> {
        self.front_matter.layout.as_deref()
    }
}

/// Compute the forward-slash path of `path` relative to `root`.
///
/// Paths with `..` components or outside `root` are rejected.
fn relative_to_root(path: &Path, root: &Path) -> Result<String, ContentError> {
    let outside = || ContentError::OutsideRoot {
        path: path.to_path_buf(),
    };
    if path.components().any(|c| matches!(c, Component::ParentDir)) || !is_within(root, path) {
        return Err(outside());
    }
    let relative = path.strip_prefix(root).map_err(|_| outside())?;
    if relative.as_os_str().is_empty() {
        return Err(outside());
    }
    Ok(to_slash(relative))
}

/// Fill keys missing from `map` with matching `[[defaults]]` values.
///
/// More specific scopes win over broader ones; among equals the later
/// entry wins. The document's own keys always win.
fn apply_defaults(map: &mut Map<String, Value>, config: &SiteConfig, relative: &str, kind: &str) {
    let mut matching: Vec<_> = config
        .defaults
        .iter()
        .filter(|d| d.scope.matches(relative, kind))
        .collect();
    if matching.is_empty() {
        return;
    }
    matching.sort_by_key(|d| d.scope.specificity());

    let mut merged = Map::new();
    for default in matching {
        for (key, value) in &default.values {
            merged.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in merged {
        map.entry(key).or_insert(value);
    }
}
