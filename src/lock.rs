//! Per-repository advisory locking.
//!
//! Two concurrent runs against the same repository could both decide a
//! period slot is free and race to populate it, or double-delete. A lock
//! file with create-new semantics in the repository directory keeps a single
//! run as the only mutator; the catalog never treats the lock file as a
//! snapshot.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Name of the lock file inside the repository directory.
pub const LOCK_FILE_NAME: &str = ".snapward.lock";

/// RAII advisory lock on one repository directory.
///
/// Holds the lock file path; the file is unlinked on drop. The PID of the
/// holding process is written into the file for operator diagnosis.
#[derive(Debug)]
pub struct RepositoryLock {
    path: PathBuf,
}

impl RepositoryLock {
    /// Acquires the lock for `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryLocked`] when the lock file already exists
    /// and [`Error::OperationFailed`] on other I/O failures.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                debug!(lock = %path.display(), "acquired repository lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::RepositoryLocked(path))
            }
            Err(e) => Err(Error::OperationFailed {
                operation: format!("lock '{}'", path.display()),
                cause: e.to_string(),
            }),
        }
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "cannot release repository lock");
        } else {
            debug!(lock = %self.path.display(), "released repository lock");
        }
    }
}
