//! Filesystem capabilities used by the packaging pipelines.
//!
//! Each pipeline asks only for the capability sets it consumes:
//! - [`ScratchDirs`]: unique scratch directories and their removal
//! - [`TreeReader`]: listing sub-directories and files
//! - [`TreeCopier`]: copying files and whole trees
//!
//! [`LocalFs`] implements all three against the host filesystem. It holds no
//! state, so one instance is shared by every concurrent run.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::FsError;

/// Result type for filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Creation and removal of uniquely named scratch directories.
pub trait ScratchDirs: Send + Sync {
    /// Create `<parent>/<uuid>` and return its path. Never reuses a name.
    fn create_unique_dir(&self, parent: &Path) -> FsResult<PathBuf>;

    /// Recursively delete `path`. Deleting a missing directory is a no-op.
    fn delete_dir(&self, path: &Path) -> FsResult<()>;
}

/// Directory listings.
pub trait TreeReader: Send + Sync {
    /// Names of the immediate sub-directories of `dir`, sorted.
    fn sub_directories(&self, dir: &Path) -> FsResult<Vec<String>>;

    /// Names of the immediate non-directory entries of `dir`, sorted.
    fn file_names(&self, dir: &Path) -> FsResult<Vec<String>>;
}

/// File and tree copies.
pub trait TreeCopier: Send + Sync {
    /// Copy a single file, overwriting `to`. Attributes are not preserved.
    fn copy_file(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Copy everything under `from` into `to`, creating `to` as needed.
    fn copy_tree(&self, from: &Path, to: &Path) -> FsResult<()>;
}

/// Host filesystem adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }

    fn list(&self, dir: &Path, want_dirs: bool) -> FsResult<Vec<String>> {
        let read_err = |source| FsError::Read {
            path: dir.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let is_dir = entry.file_type().map_err(read_err)?.is_dir();
            if is_dir == want_dirs {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ScratchDirs for LocalFs {
    fn create_unique_dir(&self, parent: &Path) -> FsResult<PathBuf> {
        let path = parent.join(Uuid::new_v4().to_string());
        fs::create_dir(&path).map_err(|source| FsError::Create {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn delete_dir(&self, path: &Path) -> FsResult<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FsError::Delete {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TreeReader for LocalFs {
    fn sub_directories(&self, dir: &Path) -> FsResult<Vec<String>> {
        self.list(dir, true)
    }

    fn file_names(&self, dir: &Path) -> FsResult<Vec<String>> {
        self.list(dir, false)
    }
}

impl TreeCopier for LocalFs {
    fn copy_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::copy(from, to).map_err(|source| FsError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn copy_tree(&self, from: &Path, to: &Path) -> FsResult<()> {
        let copy_err = |source| FsError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };
        fs::create_dir_all(to).map_err(copy_err)?;
        for entry in fs::read_dir(from).map_err(copy_err)? {
            let entry = entry.map_err(copy_err)?;
            let src = entry.path();
            let dest = to.join(entry.file_name());
            if entry.file_type().map_err(copy_err)?.is_dir() {
                self.copy_tree(&src, &dest)?;
            } else {
                self.copy_file(&src, &dest)?;
            }
        }
        Ok(())
    }
}
