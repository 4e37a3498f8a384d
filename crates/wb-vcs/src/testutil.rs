// testutil.rs — Throwaway git repositories for engine and orchestrator tests.

use std::path::Path;
use std::process::Command;

use crate::error::StorageError;
use crate::storage::{FileStorage, LocalStorage};

pub(crate) fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// `git init` on branch `main` with a committed README.md.
pub(crate) fn init_git_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "# Test\n").unwrap();
    commit_all(dir, "Initial commit");
}

pub(crate) fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
}

/// Local storage whose writes to one path always fail.
pub(crate) struct FailingStorage {
    inner: LocalStorage,
    fail_on: String,
}

impl FailingStorage {
    pub(crate) fn new(root: &Path, fail_on: &str) -> Self {
        Self {
            inner: LocalStorage::new(root),
            fail_on: fail_on.to_string(),
        }
    }
}

impl FileStorage for FailingStorage {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.read(path)
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        if path == self.fail_on {
            return Err(StorageError::IoError {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.write(path, content)
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.inner.remove(path)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(dir)
    }
}
