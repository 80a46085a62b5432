//! Bounded snapshot content loading.
//!
//! Compliance checking, ignore-masking and diff logging all need the text of
//! a snapshot. Content is loaded at most once per file per run and cached;
//! files over the size cap or with non-UTF-8 bytes yield "unavailable", which
//! degrades the affected check to a warning instead of aborting the
//! repository.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use crate::catalog::SnapshotFile;
use crate::report::humanize_size;

/// Text is only loaded for files at or below this size. A conservative limit
/// that keeps memory use and diff log output bounded.
pub const MAX_CONTENT_BYTES: u64 = 1_048_576;

/// Per-run cache of snapshot text content.
///
/// `None` entries record a failed load so the failure is reported once and
/// not retried between the compliance and comparison stages.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: HashMap<PathBuf, Option<Arc<str>>>,
}

impl ContentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text content of `file`, loading it on first access.
    ///
    /// Returns `None` when the file exceeds [`MAX_CONTENT_BYTES`], is not
    /// valid UTF-8, or cannot be read; the cause is logged.
    pub fn load(&mut self, file: &SnapshotFile) -> Option<Arc<str>> {
        if let Some(cached) = self.entries.get(&file.path) {
            return cached.clone();
        }
        debug!(
            file = %file.path.display(),
            "loading content for comparison or compliance checking"
        );
        let loaded = Self::read_bounded(file);
        self.entries.insert(file.path.clone(), loaded.clone());
        loaded
    }

    fn read_bounded(file: &SnapshotFile) -> Option<Arc<str>> {
        let outcome = if file.size > MAX_CONTENT_BYTES {
            Err("file exceeds the content size limit".to_string())
        } else {
            match std::fs::read(&file.path) {
                Ok(bytes) => String::from_utf8(bytes)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        };
        match outcome {
            Ok(text) => Some(Arc::from(text)),
            Err(cause) => {
                error!(
                    file = %file.path.display(),
                    cause,
                    limit = %humanize_size(MAX_CONTENT_BYTES),
                    "content cannot be loaded; compliance check and diff log \
                     only work for text files within the size limit"
                );
                None
            }
        }
    }
}
