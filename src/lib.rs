//! # Snapward
//!
//! Audits and maintains backup repositories: directories holding periodically
//! produced snapshot files such as nightly configuration dumps.
//!
//! For every configured repository, snapward verifies that the newest snapshot
//! is fresh, large enough and compliant with content rules, detects drift
//! between the two most recent snapshots, and enforces a tiered retention
//! policy (keep-N in place plus weekly/monthly/yearly archival buckets,
//! overflow and deletion). The result is a human-readable report, a flat
//! perfdata feed and a tri-state exit status for a monitoring system.
//!
//! ## Example
//!
//! ```rust,ignore
//! use snapward::{Config, run};
//!
//! let config = Config::load_from_file("bck_config.yaml".as_ref())?;
//! let report = run(&config);
//! print!("{}", report.text());
//! std::process::exit(report.severity().exit_code().into());
//! ```

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub mod catalog;
pub mod compare;
pub mod config;
pub mod content;
pub mod diff;
pub mod evaluate;
pub mod lock;
pub mod logging;
pub mod report;
pub mod retention;
pub mod runner;

pub use catalog::{SnapshotFile, SnapshotSet};
pub use config::{CompareConfig, ComplianceRule, Config, RepositoryConfig, TierConfig};
pub use content::{ContentCache, MAX_CONTENT_BYTES};
pub use report::{Report, RepositoryOutcome, Severity};
pub use retention::{Tier, TierOccupancy};
pub use runner::run;

/// Error type for snapward operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Most errors are contained within a single repository's processing and end
/// up in that repository's critical text; only configuration load failures
/// abort the whole process.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A configured directory does not exist or is not a directory.
    ///
    /// Raised when:
    /// - A repository's base directory is missing
    /// - A configured weekly/monthly/yearly tier directory is missing
    /// - The configured overflow (`move_old_to`) directory is missing
    #[error("directory '{}' not found", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Another run holds the repository's advisory lock.
    ///
    /// Concurrent runs against the same repository are unsafe (two runs could
    /// race to populate the same tier slot or double-delete), so a held lock
    /// skips the repository.
    #[error("repository lock '{}' is held by another run", .0.display())]
    RepositoryLocked(PathBuf),

    /// The configuration file could not be loaded or is invalid.
    ///
    /// Raised when:
    /// - The YAML config cannot be read or parsed
    /// - A glob pattern or regex fails to compile
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A filesystem operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for snapward operations.
pub type Result<T> = std::result::Result<T, Error>;
