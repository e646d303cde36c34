//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file that is not valid TOML.
    #[error("invalid TOML in `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Valid TOML that does not match the config schema.
    #[error("invalid configuration")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),
}
