//! Keep-N enforcement inside each tier directory.

use tracing::warn;

use crate::catalog::SnapshotSet;
use crate::config::RepositoryConfig;
use crate::report::RepositoryOutcome;
use crate::retention::{delete_old, keep_in_place, relocate, Tier};

/// Re-scans each configured tier directory and keeps only its own `keep`
/// newest files in place; the rest cascade to the overflow directory,
/// deletion, or the keep-in-place fallback. Each tier is enforced
/// independently, newest first, without consulting other tiers' occupancy.
pub fn enforce_tiers(repo: &RepositoryConfig, outcome: &mut RepositoryOutcome) {
    for tier in [Tier::Weekly, Tier::Monthly, Tier::Yearly] {
        let Some(cfg) = tier.config(repo) else {
            continue;
        };
        let context = format!("{}({})", repo.alias, tier.as_str());

        let set = match SnapshotSet::scan(&cfg.directory, &repo.matcher) {
            Ok(set) => set,
            Err(e) => {
                warn!("{context}: cannot enforce tier retention: {e}");
                outcome.warn(&format!(
                    "Cannot enforce retention in {} directory '{}'. ",
                    tier.as_str(),
                    cfg.directory.display()
                ));
                continue;
            }
        };

        for (index, file) in set.iter().rev().enumerate() {
            if index < cfg.keep {
                outcome.kept_files += 1;
                outcome.kept_bytes += file.size;
            } else if let Some(overflow) = repo.move_old_to.as_ref().filter(|d| d.is_dir()) {
                relocate(&context, file, overflow, &file.name, outcome);
            } else if repo.delete_old {
                delete_old(&context, file, outcome);
            } else {
                keep_in_place(&context, file, outcome);
            }
        }
    }
}
