//! Tiered retention: archival routing and per-tier overflow enforcement.
//!
//! Files beyond the repository's keep count are routed into at most one
//! dated bucket per tier (yearly, monthly, weekly), the overflow directory,
//! or deletion. [`TierOccupancy`] makes the "one file per calendar period per
//! tier" rule an explicit value built once per run instead of an implicit
//! directory-rescan side effect.

mod enforcer;
mod planner;

pub use enforcer::enforce_tiers;
pub use planner::apply_retention;

use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

use crate::catalog::{SnapshotFile, SnapshotSet};
use crate::config::{RepositoryConfig, TierConfig};
use crate::report::RepositoryOutcome;
use crate::Result;

/// One of the archival tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// One file per ISO year-week.
    Weekly,
    /// One file per year-month.
    Monthly,
    /// One file per year.
    Yearly,
}

impl Tier {
    /// Lowercase tier name for log and report messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// The calendar period key of `file` for this tier.
    #[must_use]
    pub fn period_key(self, file: &SnapshotFile) -> String {
        match self {
            Self::Weekly => file.week_key(),
            Self::Monthly => file.month_key(),
            Self::Yearly => file.year_key(),
        }
    }

    /// This repository's configuration for the tier, if any.
    #[must_use]
    pub fn config(self, repo: &RepositoryConfig) -> Option<&TierConfig> {
        match self {
            Self::Weekly => repo.weekly.as_ref(),
            Self::Monthly => repo.monthly.as_ref(),
            Self::Yearly => repo.yearly.as_ref(),
        }
    }
}

/// Period keys already represented inside each tier directory.
///
/// Built once per repository per run from a directory scan and updated
/// in-memory as files are routed, so a single period is never assigned two
/// files within one run even if a later move fails.
#[derive(Debug, Default)]
pub struct TierOccupancy {
    weeks: HashSet<String>,
    months: HashSet<String>,
    years: HashSet<String>,
}

impl TierOccupancy {
    /// Scans the repository's configured tier directories and collects the
    /// period keys of the files already present.
    ///
    /// # Errors
    ///
    /// Propagates scan failures; callers verify tier directories exist
    /// beforehand.
    pub fn scan(repo: &RepositoryConfig) -> Result<Self> {
        let mut occupancy = Self::default();
        for tier in [Tier::Weekly, Tier::Monthly, Tier::Yearly] {
            let Some(cfg) = tier.config(repo) else {
                continue;
            };
            let set = SnapshotSet::scan(&cfg.directory, &repo.matcher)?;
            for file in &set {
                occupancy.keys_mut(tier).insert(tier.period_key(file));
            }
        }
        Ok(occupancy)
    }

    /// Whether `key` is already represented in `tier`.
    #[must_use]
    pub fn contains(&self, tier: Tier, key: &str) -> bool {
        self.keys(tier).contains(key)
    }

    /// Marks `key` as occupied in `tier`.
    pub fn reserve(&mut self, tier: Tier, key: String) {
        self.keys_mut(tier).insert(key);
    }

    fn keys(&self, tier: Tier) -> &HashSet<String> {
        match tier {
            Tier::Weekly => &self.weeks,
            Tier::Monthly => &self.months,
            Tier::Yearly => &self.years,
        }
    }

    fn keys_mut(&mut self, tier: Tier) -> &mut HashSet<String> {
        match tier {
            Tier::Weekly => &mut self.weeks,
            Tier::Monthly => &mut self.months,
            Tier::Yearly => &mut self.years,
        }
    }
}

/// Moves `file` into `dest_dir` as `filename`.
///
/// A pre-existing destination aborts the move non-destructively: the source
/// stays untouched and uncounted, and the conflict is surfaced as a
/// repository warning so the operator sees it on every run. Returns whether
/// the file was moved.
pub(crate) fn relocate(
    context: &str,
    file: &SnapshotFile,
    dest_dir: &Path,
    filename: &str,
    outcome: &mut RepositoryOutcome,
) -> bool {
    let destination = dest_dir.join(filename);
    if destination.exists() {
        error!(
            "{context}: Cannot move '{}' to '{}'. Destination file already exists! ",
            file.name,
            destination.display()
        );
        outcome.warn(&format!(
            "Cannot move '{}' to '{}': destination file already exists. ",
            file.name,
            destination.display()
        ));
        return false;
    }
    info!(
        "{context}: Moving '{}' to '{}'. ",
        file.name,
        destination.display()
    );
    if let Err(e) = move_file(&file.path, &destination) {
        error!(
            "{context}: Cannot move '{}' to '{}': {e}",
            file.name,
            destination.display()
        );
        outcome.warn(&format!(
            "Cannot move '{}' to '{}'. See log file for more details. ",
            file.name,
            destination.display()
        ));
        return false;
    }
    true
}

/// Deletes `file`, counting it as an old-file deletion. Returns whether the
/// deletion succeeded.
pub(crate) fn delete_old(
    context: &str,
    file: &SnapshotFile,
    outcome: &mut RepositoryOutcome,
) -> bool {
    info!("{context}: Deleting '{}'. ", file.name);
    if let Err(e) = std::fs::remove_file(&file.path) {
        error!("{context}: Cannot delete '{}': {e}", file.name);
        outcome.warn(&format!(
            "Cannot delete old file '{}'. See log file for more details. ",
            file.name
        ));
        return false;
    }
    outcome.old_deleted += 1;
    true
}

/// Fallback when no destination applies and `delete_old` is off: the file
/// stays in place and counts toward the retained totals.
pub(crate) fn keep_in_place(context: &str, file: &SnapshotFile, outcome: &mut RepositoryOutcome) {
    info!(
        "{context}: '{}' would have been deleted, but 'delete_old' is not enabled. ",
        file.name
    );
    outcome.kept_files += 1;
    outcome.kept_bytes += file.size;
}

fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            warn!(
                src = %src.display(),
                dest = %dest.display(),
                "rename crosses filesystems, falling back to copy and delete"
            );
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;
    use std::fs;
    use std::path::PathBuf;

    fn snapshot(path: PathBuf, modified: &str) -> SnapshotFile {
        SnapshotFile {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path,
            modified: modified.parse().expect("valid timestamp"),
            size: 0,
        }
    }

    #[test]
    fn test_occupancy_scan_collects_period_keys() {
        let base = tempfile::tempdir().expect("tempdir");
        let weekly = base.path().join("weekly");
        fs::create_dir(&weekly).expect("mkdir");
        fs::write(weekly.join("w1.cfg"), b"x").expect("write");

        let yaml = format!(
            "backup_repository:\n  - directory: {0}\n    pattern: \"*.cfg\"\n    weekly:\n      directory: {1}\n      keep: 2\n",
            base.path().display(),
            weekly.display()
        );
        let repo = Config::from_yaml(&yaml)
            .expect("config parses")
            .repositories
            .remove(0);

        let occupancy = TierOccupancy::scan(&repo).expect("scan");
        let current_week = Tier::Weekly.period_key(&snapshot(
            weekly.join("w1.cfg"),
            &Utc::now().to_rfc3339(),
        ));
        assert!(occupancy.contains(Tier::Weekly, &current_week));
        assert!(!occupancy.contains(Tier::Monthly, "2026-08"));
    }

    #[test]
    fn test_reserve_and_contains() {
        let mut occupancy = TierOccupancy::default();
        assert!(!occupancy.contains(Tier::Yearly, "2026"));
        occupancy.reserve(Tier::Yearly, "2026".to_string());
        assert!(occupancy.contains(Tier::Yearly, "2026"));
        // Tiers are independent.
        assert!(!occupancy.contains(Tier::Monthly, "2026"));
    }

    #[test]
    fn test_relocate_aborts_on_existing_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest_dir = dir.path().join("old");
        fs::create_dir(&dest_dir).expect("mkdir");
        let src = dir.path().join("a.cfg");
        fs::write(&src, b"source").expect("write");
        fs::write(dest_dir.join("a.cfg"), b"existing").expect("write");

        let file = snapshot(src.clone(), "2026-01-01T00:00:00Z");
        let mut outcome = RepositoryOutcome::new("r");
        assert!(!relocate("r", &file, &dest_dir, "a.cfg", &mut outcome));
        // Non-destructive: source untouched, destination untouched.
        assert!(src.exists());
        assert_eq!(fs::read(dest_dir.join("a.cfg")).expect("read"), b"existing");
        assert!(outcome.warn_text.contains("destination file already exists"));
    }

    #[test]
    fn test_relocate_moves_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest_dir = dir.path().join("old");
        fs::create_dir(&dest_dir).expect("mkdir");
        let src = dir.path().join("a.cfg");
        fs::write(&src, b"payload").expect("write");

        let file = snapshot(src.clone(), "2026-01-01T00:00:00Z");
        let mut outcome = RepositoryOutcome::new("r");
        assert!(relocate("r", &file, &dest_dir, "renamed.cfg", &mut outcome));
        assert!(!src.exists());
        assert_eq!(fs::read(dest_dir.join("renamed.cfg")).expect("read"), b"payload");
    }
}
