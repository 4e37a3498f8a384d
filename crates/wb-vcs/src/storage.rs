// storage.rs — FileStorage seam and the local-directory implementation.
//
// Paths are always relative to the workspace root and use `/` separators.
// A missing file reads as `None`, not an error.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

/// Read/write access to a workspace's files.
pub trait FileStorage: Send + Sync {
    /// File content, or `None` if the path does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Create or overwrite a file, creating parent directories as needed.
    fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Delete a file and any parent directories it leaves empty. Removing a
    /// missing file succeeds.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Immediate entries of a directory (`""` for the root), sorted.
    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError>;
}

/// Apply writes (`Some`) and removals (`None`) as one unit.
///
/// Every target is read before anything changes. If an update fails, the
/// updates already made (and the failed one) are reverted to the content read
/// up front and the original error is returned.
pub fn apply_updates(
    storage: &dyn FileStorage,
    updates: &[(&str, Option<&[u8]>)],
) -> Result<(), StorageError> {
    let previous = updates
        .iter()
        .map(|(path, _)| storage.read(path))
        .collect::<Result<Vec<_>, _>>()?;

    for (done, (path, content)) in updates.iter().enumerate() {
        let result = match content {
            Some(bytes) => storage.write(path, bytes),
            None => storage.remove(path),
        };
        if let Err(e) = result {
            for ((path, _), before) in updates[..=done].iter().zip(&previous).rev() {
                let restored = match before {
                    Some(bytes) => storage.write(path, bytes),
                    None => storage.remove(path),
                };
                if let Err(undo) = restored {
                    tracing::warn!("could not restore {} after a failed update: {}", path, undo);
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Storage rooted at a project directory on the local filesystem.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path inside the root, rejecting anything that could
    /// escape it.
    fn resolve_path(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        let candidate = Path::new(relative_path);
        let escapes = candidate.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(StorageError::PathTraversal {
                path: relative_path.to_string(),
            });
        }
        Ok(self.root.join(candidate))
    }

    /// Remove empty directories from `removed`'s parent up to (not including)
    /// the root. Stops at the first directory that is not empty.
    fn prune_empty_parents(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::IoError {
            path: path.display().to_string(),
            source,
        }
    }
}

impl FileStorage for LocalStorage {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let full = self.resolve_path(path)?;
        match fs::read(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&full)(e)),
        }
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(Self::io_error(parent))?;
        }
        fs::write(&full, content).map_err(Self::io_error(&full))
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve_path(path)?;
        match fs::remove_file(&full) {
            Ok(()) => {
                self.prune_empty_parents(&full);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&full)(e)),
        }
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        let full = self.resolve_path(dir)?;
        let entries = fs::read_dir(&full).map_err(Self::io_error(&full))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::io_error(&full))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".git" {
                continue;
            }
            let dir = dir.trim_end_matches('/');
            names.push(if dir.is_empty() {
                name
            } else {
                format!("{}/{}", dir, name)
            });
        }
        names.sort();
        Ok(names)
    }
}
