//! Non-template assets copied verbatim.

use crate::{
    error::ContentError,
    utils::path::{is_within, to_slash},
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// An asset (image, script, stylesheet) copied to the destination as-is.
///
/// Its URL is its path relative to the root it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub size: u64,
    pub mtime: SystemTime,
    pub url: String,
}

impl StaticFile {
    pub fn new(path: &Path, root: &Path) -> Result<Self, ContentError> {
        let relative = path
            .strip_prefix(root)
            .ok()
            .filter(|_| is_within(root, path))
            .map(to_slash)
            .filter(|rel| !rel.is_empty())
            .ok_or_else(|| ContentError::OutsideRoot {
                path: path.to_path_buf(),
            })?;

        let metadata = fs::metadata(path).map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(Self {
            path: path.to_path_buf(),
            url: format!("/{relative}"),
            relative_path: relative,
            size: metadata.len(),
            mtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_file_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img/logo.png");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let file = StaticFile::new(&path, dir.path()).unwrap();
        assert_eq!(file.relative_path, "img/logo.png");
        assert_eq!(file.url, "/img/logo.png");
        assert_eq!(file.size, 4);
    }

    #[test]
    fn test_static_file_outside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("site");
        fs::create_dir_all(&root).unwrap();
        let path = dir.path().join("other.css");
        fs::write(&path, "x").unwrap();

        assert!(matches!(
            StaticFile::new(&path, &root),
            Err(ContentError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_static_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.js");
        assert!(matches!(
            StaticFile::new(&path, dir.path()),
            Err(ContentError::Io { .. })
        ));
    }
}
