//! Output file destinations.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a path cannot be used as an output target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Something already lives at the path.
    #[error("file at path '{}' already exists", .0.display())]
    Exists(PathBuf),
    /// Existence could not be determined.
    #[error("cannot inspect '{}': {}", .0.display(), .1)]
    Inspect(PathBuf, std::io::Error),
}

/// A destination for a still image or recording that did not exist when
/// it was claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    path: PathBuf,
}

impl OutputTarget {
    /// Claims `path` if nothing exists there.
    pub fn vacant(path: impl Into<PathBuf>) -> Result<Self, TargetError> {
        let path = path.into();
        match path.try_exists() {
            Ok(false) => Ok(Self { path }),
            Ok(true) => Err(TargetError::Exists(path)),
            Err(e) => Err(TargetError::Inspect(path, e)),
        }
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consumes the target.
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacant_path_is_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let target = OutputTarget::vacant(dir.path().join("new.jpg")).unwrap();
        assert_eq!(target.path(), dir.path().join("new.jpg"));
    }

    #[test]
    fn test_existing_path_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.mp4");
        std::fs::write(&path, b"x").unwrap();

        assert!(matches!(
            OutputTarget::vacant(&path),
            Err(TargetError::Exists(p)) if p == path
        ));
    }
}
