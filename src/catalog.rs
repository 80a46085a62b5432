//! Snapshot discovery and ordinal access.
//!
//! A [`SnapshotSet`] is the ordered view of one directory: every regular file
//! matching the repository pattern, ascending by modification time. The
//! newest and previous snapshots are ordinal lookups on that order, and the
//! set shrinks visibly when the comparator deletes a redundant newest file.

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use globset::GlobMatcher;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::lock::LOCK_FILE_NAME;
use crate::{Error, Result};

/// One snapshot file: an immutable value record describing a filesystem
/// entry. It does not own the file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// File name component, used in report messages.
    pub name: String,
    /// Modification timestamp.
    pub modified: DateTime<Utc>,
    /// Size in bytes.
    pub size: u64,
}

impl SnapshotFile {
    /// Age of the snapshot relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.modified)
    }

    /// ISO year-week period key, e.g. `2026-W35`.
    #[must_use]
    pub fn week_key(&self) -> String {
        let iso = self.modified.iso_week();
        format!("{}-W{:02}", iso.year(), iso.week())
    }

    /// Year-month period key, e.g. `2026-08`.
    #[must_use]
    pub fn month_key(&self) -> String {
        format!("{}-{:02}", self.modified.year(), self.modified.month())
    }

    /// Year period key, e.g. `2026`.
    #[must_use]
    pub fn year_key(&self) -> String {
        format!("{}", self.modified.year())
    }
}

/// Ordered set of snapshot files for one directory, oldest first.
#[derive(Debug, Default)]
pub struct SnapshotSet {
    files: Vec<SnapshotFile>,
}

impl SnapshotSet {
    /// Scans `dir` for regular files matching `matcher` and returns them
    /// ordered ascending by modification time. Ties break by file name so
    /// that "newest" and "previous" stay well defined.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryNotFound`] if `dir` does not exist or is not
    /// a directory, and [`Error::OperationFailed`] if it cannot be read.
    pub fn scan(dir: &Path, matcher: &GlobMatcher) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::DirectoryNotFound(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| Error::OperationFailed {
            operation: format!("scan '{}'", dir.display()),
            cause: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::OperationFailed {
                operation: format!("scan '{}'", dir.display()),
                cause: e.to_string(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LOCK_FILE_NAME || !matcher.is_match(Path::new(&name)) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            files.push(SnapshotFile {
                path: entry.path(),
                name,
                modified,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
        debug!(
            directory = %dir.display(),
            count = files.len(),
            "found matching snapshot files"
        );
        Ok(Self { files })
    }

    /// Number of snapshots in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` when no snapshot matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The most recently modified snapshot.
    #[must_use]
    pub fn newest(&self) -> Option<&SnapshotFile> {
        self.files.last()
    }

    /// The second most recently modified snapshot.
    #[must_use]
    pub fn previous(&self) -> Option<&SnapshotFile> {
        self.files.len().checked_sub(2).map(|i| &self.files[i])
    }

    /// Iterates snapshots oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, SnapshotFile> {
        self.files.iter()
    }

    /// Removes and returns the newest snapshot, shrinking the set for all
    /// downstream stages.
    pub fn remove_newest(&mut self) -> Option<SnapshotFile> {
        self.files.pop()
    }
}

impl<'a> IntoIterator for &'a SnapshotSet {
    type Item = &'a SnapshotFile;
    type IntoIter = std::slice::Iter<'a, SnapshotFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
