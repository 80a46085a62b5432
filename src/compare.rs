//! Comparison of the newest snapshot against the previous one.
//!
//! Equality is byte-exact and independent of the text content cap, so large
//! binary snapshots still compare correctly. Masking via `ignore_regex`, and
//! diff logging, work on cached text content and degrade to a warning when
//! that content is unavailable. When the newest snapshot is older than
//! `warn_age_limit`, outcomes are still computed (deletion side effects
//! apply) but suppressed from the report.

use chrono::{DateTime, TimeDelta, Utc};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{error, info, trace, warn};

use crate::catalog::{SnapshotFile, SnapshotSet};
use crate::config::{CompareConfig, RepositoryConfig};
use crate::content::ContentCache;
use crate::diff::unified_diff;
use crate::report::RepositoryOutcome;

/// Placeholder substituted for every `ignore_regex` match before the second
/// equality test.
const IGNORE_PLACEHOLDER: &str = "[ignored]";

/// Context lines on each side of a diff hunk in the log.
const DIFF_CONTEXT: usize = 2;

/// Compares the newest snapshot with the previous one and applies the
/// configured reporting and deletion policy. Requires at least two files in
/// `set`; does nothing otherwise.
pub fn compare_with_previous(
    repo: &RepositoryConfig,
    cfg: &CompareConfig,
    set: &mut SnapshotSet,
    now: DateTime<Utc>,
    cache: &mut ContentCache,
    outcome: &mut RepositoryOutcome,
) {
    let (Some(newest), Some(previous)) = (set.newest().cloned(), set.previous().cloned()) else {
        return;
    };

    let suppressed = cfg.warn_age_limit_days.is_some_and(|days| {
        newest.age(now) > TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX)
    });

    let equal = match files_equal(&previous.path, &newest.path) {
        Ok(equal) => equal,
        Err(e) => {
            error!(
                alias = repo.alias,
                newest = newest.name,
                previous = previous.name,
                error = %e,
                "cannot compare newest file with previous file"
            );
            outcome.warn(&format!(
                "Cannot compare '{}' with '{}'. See log file for more details. ",
                newest.name, previous.name
            ));
            return;
        }
    };

    if equal {
        report_equal(repo, cfg, &newest, &previous, suppressed, outcome);
        if cfg.delete_if_equal {
            delete_newest(repo, set, &newest, "it is equal to previous file", outcome);
        }
        return;
    }

    let ignored_equal = matches_ignoring(repo, cfg, &newest, &previous, cache, outcome);
    if suppressed {
        trace!(
            alias = repo.alias,
            newest = newest.name,
            ignored_equal,
            "newest file has changed compared to previous file and is older \
             than defined 'warn_age_limit' for comparison"
        );
    } else if ignored_equal {
        info!(
            alias = repo.alias,
            "Newest file '{}' differs from previous file '{}' only in ignored regions. ",
            newest.name, previous.name
        );
    } else {
        let message = format!(
            "Newest file '{}' has changed compared to previous file '{}'. ",
            newest.name, previous.name
        );
        if cfg.warn_if_changed {
            warn!(alias = repo.alias, "{message}");
            outcome.warn(&message);
        } else {
            info!(alias = repo.alias, "{message}");
        }
        if cfg.log_diff {
            log_diff(&newest, &previous, cache, outcome);
        }
    }

    if ignored_equal && cfg.delete_if_equal && cfg.delete_if_ignored {
        delete_newest(
            repo,
            set,
            &newest,
            "only ignored regions changed compared to previous file",
            outcome,
        );
    }
}

fn report_equal(
    repo: &RepositoryConfig,
    cfg: &CompareConfig,
    newest: &SnapshotFile,
    previous: &SnapshotFile,
    suppressed: bool,
    outcome: &mut RepositoryOutcome,
) {
    if suppressed {
        trace!(
            alias = repo.alias,
            newest = newest.name,
            "newest file equals previous file and is older than defined \
             'warn_age_limit' for comparison"
        );
        return;
    }
    let message = format!(
        "Content of newest file '{}' equals content of previous file '{}'. ",
        newest.name, previous.name
    );
    if cfg.warn_if_equal {
        warn!(alias = repo.alias, "{message}");
        outcome.warn(&message);
    } else {
        info!(alias = repo.alias, "{message}");
    }
}

/// Whether the two differing snapshots become equal once `ignore_regex`
/// matches are masked out.
fn matches_ignoring(
    repo: &RepositoryConfig,
    cfg: &CompareConfig,
    newest: &SnapshotFile,
    previous: &SnapshotFile,
    cache: &mut ContentCache,
    outcome: &mut RepositoryOutcome,
) -> bool {
    let Some(ignore) = &cfg.ignore_regex else {
        return false;
    };
    let (Some(newest_content), Some(previous_content)) =
        (cache.load(newest), cache.load(previous))
    else {
        outcome.warn(&format!(
            "Differences between '{}' and '{}' cannot be checked against the \
             ignore pattern. See log file for more details. ",
            newest.name, previous.name
        ));
        return false;
    };
    let masked_newest = ignore.replace_all(&newest_content, IGNORE_PLACEHOLDER);
    let masked_previous = ignore.replace_all(&previous_content, IGNORE_PLACEHOLDER);
    let ignored_equal = masked_newest == masked_previous;
    trace!(
        alias = repo.alias,
        newest = newest.name,
        ignored_equal,
        "re-compared after masking ignorable regions"
    );
    ignored_equal
}

fn log_diff(
    newest: &SnapshotFile,
    previous: &SnapshotFile,
    cache: &mut ContentCache,
    outcome: &mut RepositoryOutcome,
) {
    let (Some(newest_content), Some(previous_content)) =
        (cache.load(newest), cache.load(previous))
    else {
        outcome.warn(&format!(
            "Differences between '{}' and '{}' cannot be logged. \
             See log file for more details. ",
            newest.name, previous.name
        ));
        return;
    };
    let diff = unified_diff(
        &previous_content,
        &newest_content,
        &format!("{}\t{}", previous.name, previous.modified.to_rfc3339()),
        &format!("{}\t{}", newest.name, newest.modified.to_rfc3339()),
        DIFF_CONTEXT,
    );
    info!("Differences:\n{diff}");
}

fn delete_newest(
    repo: &RepositoryConfig,
    set: &mut SnapshotSet,
    newest: &SnapshotFile,
    reason: &str,
    outcome: &mut RepositoryOutcome,
) {
    info!(
        alias = repo.alias,
        "Deleting '{}' because {reason}. ", newest.name
    );
    if let Err(e) = std::fs::remove_file(&newest.path) {
        error!(
            alias = repo.alias,
            file = newest.name,
            error = %e,
            "cannot delete redundant newest file"
        );
        outcome.warn(&format!("Cannot delete redundant file '{}'. ", newest.name));
        return;
    }
    set.remove_newest();
    outcome.newest_deleted += 1;
}

/// Byte-exact file comparison, chunked so file size is unbounded.
fn files_equal(a: &Path, b: &Path) -> std::io::Result<bool> {
    let meta_a = std::fs::metadata(a)?;
    let meta_b = std::fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = vec![0u8; 64 * 1024];
    let mut buf_b = vec![0u8; 64 * 1024];
    loop {
        let read_a = read_full(&mut file_a, &mut buf_a)?;
        let read_b = read_full(&mut file_b, &mut buf_b)?;
        if buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
