//! Per-repository pipeline and the run loop.
//!
//! Repositories are processed one at a time in configuration order; within a
//! repository the stages run strictly in sequence: lock, catalog, preflight,
//! evaluation, comparison, retention routing, tier enforcement. Every failure
//! is contained within its repository's outcome; nothing raises out of the
//! run loop.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::catalog::SnapshotSet;
use crate::compare::compare_with_previous;
use crate::config::{Config, RepositoryConfig};
use crate::content::ContentCache;
use crate::evaluate::evaluate_newest;
use crate::lock::RepositoryLock;
use crate::report::{Report, RepositoryOutcome};
use crate::retention::{apply_retention, enforce_tiers, Tier, TierOccupancy};

/// Runs the full audit over every configured repository and returns the
/// folded report.
#[must_use]
pub fn run(config: &Config) -> Report {
    let now = Utc::now();
    let mut report = Report::new();
    for repo in &config.repositories {
        let outcome = process_repository(repo, now);
        report.push(&outcome);
    }
    info!(" ===== Execution Report ===== \n{}\n ", report.text());
    debug!(" ========= Perfdata ========= \n{}\n ", report.perfdata_line());
    report
}

/// Processes a single repository through all pipeline stages.
#[must_use]
pub fn process_repository(repo: &RepositoryConfig, now: DateTime<Utc>) -> RepositoryOutcome {
    let mut outcome = RepositoryOutcome::new(&repo.alias);
    outcome.warn_age_days = repo.warn_age_days;

    if !preflight(repo, &mut outcome) {
        outcome.skipped = true;
        return outcome;
    }

    // Hold the advisory lock for the rest of this repository's processing.
    let _lock = match RepositoryLock::acquire(&repo.directory) {
        Ok(lock) => lock,
        Err(e) => {
            let message = format!("{e}. ");
            error!(alias = repo.alias, "{message}");
            outcome.crit(&message);
            outcome.skipped = true;
            return outcome;
        }
    };

    let mut set = match SnapshotSet::scan(&repo.directory, &repo.matcher) {
        Ok(set) => set,
        Err(e) => {
            let message = format!("{e}. ");
            error!(alias = repo.alias, "{message}");
            outcome.crit(&message);
            outcome.skipped = true;
            return outcome;
        }
    };

    let mut occupancy = match TierOccupancy::scan(repo) {
        Ok(occupancy) => occupancy,
        Err(e) => {
            let message = format!("{e}. ");
            error!(alias = repo.alias, "{message}");
            outcome.crit(&message);
            outcome.skipped = true;
            return outcome;
        }
    };

    if set.is_empty() {
        let message = format!(
            "Directory '{}' does not contain any file matching the pattern '{}'. ",
            repo.directory.display(),
            repo.pattern
        );
        warn!(alias = repo.alias, "{message}");
        outcome.warn(&message);
    }

    let mut cache = ContentCache::new();

    if let Some(newest) = set.newest().cloned() {
        outcome.newest_age_days = Some(newest.age(now).num_days());
        evaluate_newest(repo, &newest, now, &mut cache, &mut outcome);
    }

    if let Some(cfg) = &repo.compare {
        if set.len() >= 2 {
            compare_with_previous(repo, cfg, &mut set, now, &mut cache, &mut outcome);
        }
    }

    apply_retention(repo, &set, &mut occupancy, now, &mut outcome);
    enforce_tiers(repo, &mut outcome);

    outcome
}

/// Verifies that the base directory and every configured tier and overflow
/// directory exist. Missing directories are fatal for the repository: each
/// one appends critical text, and any failure skips all further stages.
fn preflight(repo: &RepositoryConfig, outcome: &mut RepositoryOutcome) -> bool {
    if !repo.directory.is_dir() {
        let message = format!("Directory '{}' not found. ", repo.directory.display());
        error!(alias = repo.alias, "{message}");
        outcome.crit(&message);
    }

    for tier in [Tier::Weekly, Tier::Monthly, Tier::Yearly] {
        let Some(cfg) = tier.config(repo) else {
            continue;
        };
        if !cfg.directory.is_dir() {
            let message = format!(
                "{} directory '{}' does not exist. Please create the directory. ",
                capitalize(tier.as_str()),
                cfg.directory.display()
            );
            error!(alias = repo.alias, "{message}");
            outcome.crit(&message);
        }
    }

    if let Some(overflow) = &repo.move_old_to {
        if !overflow.is_dir() {
            let message = format!(
                "'move_old_to' directory '{}' does not exist. Please create the directory. ",
                overflow.display()
            );
            error!(alias = repo.alias, "{message}");
            outcome.crit(&message);
        }
    }

    outcome.crit_text.is_empty()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}
