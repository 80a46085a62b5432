//! Freshness, size and compliance checks on the newest snapshot.

use chrono::{DateTime, TimeDelta, Utc};
use regex::{Captures, Regex};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::catalog::SnapshotFile;
use crate::config::RepositoryConfig;
use crate::content::ContentCache;
use crate::report::{humanize_size, plural, RepositoryOutcome};

/// Failure to expand a violation-message template.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ExpansionError {
    /// The template references a group the rule's regex does not define.
    #[error("unknown capture group '{0}'")]
    UnknownGroup(String),
    /// A `${` reference is missing its closing brace.
    #[error("unterminated group reference")]
    Unterminated,
}

/// Expands a violation-message template with a rule match's capture groups.
///
/// Supports the `regex` crate's `$1`, `$name` and `${name}` references plus
/// `$$` for a literal dollar sign. Unlike [`Captures::expand`], references to
/// groups the pattern does not define are an error instead of silently
/// expanding to nothing, so misconfigured templates surface in the report.
///
/// # Errors
///
/// Returns [`ExpansionError`] for unknown group references or an unterminated
/// `${` reference.
pub fn expand_template(
    template: &str,
    regex: &Regex,
    caps: &Captures<'_>,
) -> Result<String, ExpansionError> {
    validate_references(template, regex)?;
    let mut expanded = String::with_capacity(template.len());
    caps.expand(template, &mut expanded);
    Ok(expanded)
}

fn validate_references(template: &str, regex: &Regex) -> Result<(), ExpansionError> {
    let mut rest = template;
    while let Some(idx) = rest.find('$') {
        rest = &rest[idx + 1..];
        let mut chars = rest.chars();
        match chars.next() {
            // Literal dollar sign.
            Some('$') => rest = &rest[1..],
            Some('{') => {
                let Some(end) = rest.find('}') else {
                    return Err(ExpansionError::Unterminated);
                };
                check_group(&rest[1..end], regex)?;
                rest = &rest[end + 1..];
            }
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                let len = rest
                    .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                    .unwrap_or(rest.len());
                check_group(&rest[..len], regex)?;
                rest = &rest[len..];
            }
            // A bare trailing `$` expands to itself.
            _ => {}
        }
    }
    Ok(())
}

fn check_group(name: &str, regex: &Regex) -> Result<(), ExpansionError> {
    if name.is_empty() {
        return Err(ExpansionError::UnknownGroup(String::new()));
    }
    let known = if let Ok(index) = name.parse::<usize>() {
        index < regex.captures_len()
    } else {
        regex.capture_names().flatten().any(|n| n == name)
    };
    if known {
        Ok(())
    } else {
        Err(ExpansionError::UnknownGroup(name.to_string()))
    }
}

/// Checks the newest snapshot against the repository's age, size and
/// compliance thresholds, accumulating warnings and criticals into `outcome`.
pub fn evaluate_newest(
    repo: &RepositoryConfig,
    newest: &SnapshotFile,
    now: DateTime<Utc>,
    cache: &mut ContentCache,
    outcome: &mut RepositoryOutcome,
) {
    debug!(
        alias = repo.alias,
        file = newest.name,
        "newest file in the repository"
    );

    if let Some(days) = repo.warn_age_days {
        let age = newest.age(now);
        let threshold = TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX);
        if age > threshold {
            let message = format!(
                "Newest file '{}' is older than defined warn_age (Age: {}, warn_age: {} day{}). ",
                newest.name,
                age.num_days(),
                days,
                plural(days.unsigned_abs()),
            );
            warn!(alias = repo.alias, "{message}");
            outcome.warn(&message);
        }
    }

    if let Some(threshold) = repo.warn_bytes {
        if newest.size < threshold {
            let message = format!(
                "Newest file '{}' is smaller than defined warn_bytes (Size: {}, warn_bytes: {} bytes). ",
                newest.name,
                humanize_size(newest.size),
                threshold,
            );
            warn!(alias = repo.alias, "{message}");
            outcome.warn(&message);
        }
    }

    if !repo.compliance.is_empty() {
        outcome.compliance_checked = true;
        check_compliance(repo, newest, cache, outcome);
    }
}

fn check_compliance(
    repo: &RepositoryConfig,
    newest: &SnapshotFile,
    cache: &mut ContentCache,
    outcome: &mut RepositoryOutcome,
) {
    let Some(content) = cache.load(newest) else {
        outcome.warn(&format!(
            "Content of '{}' can't be loaded for compliance checking. \
             See log file for more details. ",
            newest.name
        ));
        return;
    };

    for rule in &repo.compliance {
        let caps = rule.regex.captures(&content);
        let violated = caps.is_some() == rule.must_not_match;
        if !violated {
            debug!(
                alias = repo.alias,
                file = newest.name,
                pattern = rule.pattern,
                "newest file is compliant"
            );
            continue;
        }

        outcome.compliance_violations += 1;
        let message = match (&rule.violation_message, &caps) {
            (Some(template), Some(caps)) => {
                match expand_template(template, &rule.regex, caps) {
                    Ok(expanded) => format!(
                        "Compliance violation in file '{}': {} ",
                        newest.name, expanded
                    ),
                    Err(e) => format!(
                        "Error: Cannot expand violation_message '{template}': {e}. "
                    ),
                }
            }
            (Some(template), None) => format!(
                "Compliance violation in file '{}': {template} ",
                newest.name
            ),
            (None, matched) => format!(
                "Compliance violation in file '{}': Does {}match regex '{}'. ",
                newest.name,
                if matched.is_some() { "" } else { "not " },
                rule.pattern,
            ),
        };
        tracing::error!(alias = repo.alias, "{message}");
        outcome.crit(&message);
    }
}
