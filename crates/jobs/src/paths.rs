//! Resolution of caller-supplied file names for output capture and uploads.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Directory that capture and upload file names are resolved against.
///
/// When confined (the default), names must be relative and may not climb out
/// of the root with `..`. Unconfined roots accept any name; relative names
/// are still joined onto the root and absolute names are used as given.
#[derive(Debug, Clone)]
pub struct FileRoot {
    root: PathBuf,
    confined: bool,
}

impl FileRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            confined: true,
        }
    }

    pub fn unconfined(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            confined: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_confined(&self) -> bool {
        self.confined
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, PathError> {
        if name.is_empty() {
            return Err(PathError::Empty);
        }
        let path = Path::new(name);
        if self.confined {
            let escapes = path.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
            if escapes {
                return Err(PathError::Escapes {
                    name: name.to_string(),
                });
            }
        }
        Ok(self.root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_name_joins_root() {
        let root = FileRoot::new("/srv/exp");
        assert_eq!(
            root.resolve("tgen.bridge.log").unwrap(),
            PathBuf::from("/srv/exp/tgen.bridge.log")
        );
        assert_eq!(
            root.resolve("logs/./run.err").unwrap(),
            PathBuf::from("/srv/exp/logs/./run.err")
        );
    }

    #[test]
    fn test_confined_rejects_escapes() {
        let root = FileRoot::new("/srv/exp");
        assert!(matches!(
            root.resolve("../secret"),
            Err(PathError::Escapes { .. })
        ));
        assert!(matches!(
            root.resolve("logs/../../secret"),
            Err(PathError::Escapes { .. })
        ));
        assert!(matches!(
            root.resolve("/tmp/obs-client"),
            Err(PathError::Escapes { .. })
        ));
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(FileRoot::new("/srv").resolve(""), Err(PathError::Empty));
        assert_eq!(FileRoot::unconfined("/srv").resolve(""), Err(PathError::Empty));
    }

    #[test]
    fn test_unconfined_accepts_absolute() {
        let root = FileRoot::unconfined("/srv/exp");
        assert!(!root.is_confined());
        assert_eq!(
            root.resolve("/tmp/obs-client").unwrap(),
            PathBuf::from("/tmp/obs-client")
        );
        assert_eq!(
            root.resolve("../up.log").unwrap(),
            PathBuf::from("/srv/exp/../up.log")
        );
    }
}
