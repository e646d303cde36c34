//! Error types shared across the build pipeline.
//!
//! | Error          | Scope                                   | Policy    |
//! |----------------|-----------------------------------------|-----------|
//! | `ContentError` | reading or parsing one source file      | recovered |
//! | `ThemeError`   | theme lookup and logical-name checks    | fatal     |
//! | `RenderError`  | templates, layouts, conversion          | fatal     |
//! | `BuildError`   | filesystem, output paths, per-document  | fatal     |

use crate::config::ConfigError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Failure to read or parse a single content file.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid front matter in `{}`", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid front matter in `{}`: {message}", path.display())]
    FrontMatterShape { path: PathBuf, message: String },

    #[error("invalid data file `{}`: {message}", path.display())]
    Data { path: PathBuf, message: String },

    #[error("`{}` is outside the source root", path.display())]
    OutsideRoot { path: PathBuf },
}

/// Theme resolution failures.
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("theme `{0}` not found")]
    NotFound(String),

    #[error("rejected unsafe name `{0}`")]
    UnsafeName(String),

    #[error("invalid theme manifest `{}`", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Template, layout and conversion failures.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error in `{name}`")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("layout cycle: {0}")]
    LayoutCycle(String),

    #[error(transparent)]
    Layout(#[from] ThemeError),

    #[error("failed to serialize template context")]
    Context(#[from] serde_json::Error),
}

/// Fatal build failures.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to {action} `{}`", path.display())]
    FileSystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build `{path}`")]
    Document {
        path: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("output path for `{url}` escapes the destination")]
    UnsafeOutputPath { url: String },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Theme(#[from] ThemeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    /// Shorthand for [`BuildError::FileSystem`].
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileSystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with the relative path of the document being built.
    pub fn in_document(self, path: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
