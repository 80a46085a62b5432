//! Retention routing for files beyond the keep count.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use tracing::error;

use crate::catalog::SnapshotSet;
use crate::config::RepositoryConfig;
use crate::report::RepositoryOutcome;
use crate::retention::{delete_old, keep_in_place, relocate, Tier, TierOccupancy};

/// Routes every file beyond the configured `keep` count, oldest first,
/// through the destination priority chain: yearly tier, monthly tier, weekly
/// tier (one file per calendar period each), overflow directory, deletion,
/// or the keep-in-place fallback. The `keep` most recent files stay untouched
/// and count toward the retained totals.
pub fn apply_retention(
    repo: &RepositoryConfig,
    set: &SnapshotSet,
    occupancy: &mut TierOccupancy,
    now: DateTime<Utc>,
    outcome: &mut RepositoryOutcome,
) {
    let total = set.len();
    for (index, file) in set.iter().enumerate() {
        let beyond_keep = repo.keep.is_some_and(|keep| total - index > keep);
        if !beyond_keep {
            outcome.kept_files += 1;
            outcome.kept_bytes += file.size;
            continue;
        }

        let filename = destination_name(repo.rename_moved_files.as_deref(), &file.name, now);

        // Priority chain; the first tier with a free period slot wins, and
        // the slot is reserved at route time so a failed move cannot hand the
        // same period to a later file.
        let mut destination = None;
        for tier in [Tier::Yearly, Tier::Monthly, Tier::Weekly] {
            let Some(cfg) = tier.config(repo) else {
                continue;
            };
            let key = tier.period_key(file);
            if cfg.directory.is_dir() && !occupancy.contains(tier, &key) {
                occupancy.reserve(tier, key);
                destination = Some(cfg.directory.clone());
                break;
            }
        }
        if destination.is_none() {
            destination = repo
                .move_old_to
                .as_ref()
                .filter(|dir| dir.is_dir())
                .cloned();
        }

        if let Some(dest_dir) = destination {
            relocate(&repo.alias, file, &dest_dir, &filename, outcome);
        } else if repo.delete_old {
            delete_old(&repo.alias, file, outcome);
        } else {
            keep_in_place(&repo.alias, file, outcome);
        }
    }
}

/// Computes the destination file name: `{}` in the rename template expands to
/// the original name, then the result is strftime-formatted with the current
/// time. An invalid template falls back to the original name.
fn destination_name(template: Option<&str>, name: &str, now: DateTime<Utc>) -> String {
    let Some(template) = template else {
        return name.to_string();
    };
    let expanded = template.replace("{}", name);
    let items: Vec<Item<'_>> = StrftimeItems::new(&expanded).collect();
    if items.contains(&Item::Error) {
        error!(template, "invalid rename_moved_files template, keeping original file name");
        return name.to_string();
    }
    now.format_with_items(items.into_iter()).to_string()
}
