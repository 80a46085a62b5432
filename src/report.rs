//! Report aggregation, perfdata and severity.
//!
//! Each repository's processing fills a [`RepositoryOutcome`]; the run loop
//! folds outcomes into a process-wide [`Report`]. The report carries the
//! human-readable text (totals summary first, one line per repository), the
//! ordered perfdata entries, and the worst-of severity that maps to the
//! monitoring exit code.

/// Three-level outcome severity, worst-of across repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Everything within thresholds.
    #[default]
    Ok,
    /// At least one warning was accumulated.
    Warning,
    /// At least one critical condition was accumulated.
    Critical,
}

impl Severity {
    /// Monitoring exit code: OK=0, WARNING=1, CRITICAL=2.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }

    /// Report label for this severity.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// The worse of two severities.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Renders a byte count with binary units, e.g. `3.4 KiB`.
#[must_use]
pub fn humanize_size(num: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mut value = num as f64;
    for unit in ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1} YiB")
}

/// `"s"` when `n` is not exactly one, for report pluralization.
#[must_use]
pub fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Accumulated result of processing one repository.
#[derive(Debug, Default)]
pub struct RepositoryOutcome {
    /// Display alias.
    pub alias: String,
    /// Concatenated warning messages.
    pub warn_text: String,
    /// Concatenated critical messages.
    pub crit_text: String,
    /// Set when a fatal precondition (missing directory, held lock) skipped
    /// all stages; the repository then contributes zero counters and no
    /// perfdata.
    pub skipped: bool,
    /// Files retained in place (base directory and tiers).
    pub kept_files: u64,
    /// Bytes retained in place.
    pub kept_bytes: u64,
    /// Aging files deleted by retention routing.
    pub old_deleted: u64,
    /// Newest files deleted by the comparator (tracked separately from
    /// `old_deleted`).
    pub newest_deleted: u64,
    /// Compliance violations found in the newest snapshot.
    pub compliance_violations: u64,
    /// Whether any compliance rule was configured.
    pub compliance_checked: bool,
    /// Whole-day age of the newest snapshot, when one existed.
    pub newest_age_days: Option<i64>,
    /// Configured freshness threshold, embedded in the age perfdata.
    pub warn_age_days: Option<i64>,
}

impl RepositoryOutcome {
    /// Creates an empty outcome for `alias`.
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Self::default()
        }
    }

    /// Appends a warning message.
    pub fn warn(&mut self, message: &str) {
        self.warn_text.push_str(message);
    }

    /// Appends a critical message.
    pub fn crit(&mut self, message: &str) {
        self.crit_text.push_str(message);
    }

    /// Severity derived from the accumulated text; critical takes precedence.
    #[must_use]
    pub fn severity(&self) -> Severity {
        if !self.crit_text.is_empty() {
            Severity::Critical
        } else if !self.warn_text.is_empty() {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    /// Total deletions (retention plus comparator).
    #[must_use]
    pub fn deleted_total(&self) -> u64 {
        self.old_deleted + self.newest_deleted
    }

    /// Formats this repository's report line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let severity = self.severity();
        if self.skipped {
            return format!("\n[{}] {}", severity.label(), self.crit_text);
        }

        let mut line = format!(
            "\n[{}] {}: {}{}Repository contains {} matching file{} with {}. ",
            severity.label(),
            self.alias,
            self.crit_text,
            self.warn_text,
            self.kept_files,
            plural(self.kept_files),
            humanize_size(self.kept_bytes),
        );
        if let Some(age) = self.newest_age_days {
            let age_u = age.unsigned_abs();
            if self.newest_deleted > 0 {
                line.push_str(&format!(
                    "Newest file was {age} day{} old and was deleted, because there \
                     were no changes compared to previous file. ",
                    plural(age_u)
                ));
            } else {
                line.push_str(&format!(
                    "Newest file is {age} day{} old. ",
                    plural(age_u)
                ));
            }
        }
        line.push_str(&format!(
            "{} old file{} deleted. ",
            self.old_deleted,
            plural(self.old_deleted)
        ));
        if self.compliance_checked && self.compliance_violations == 0 {
            line.push_str("No compliance violations. ");
        }
        line
    }

    /// Formats this repository's perfdata entries, keyed by the sanitized
    /// alias (spaces replaced).
    #[must_use]
    pub fn perfdata(&self) -> Vec<String> {
        if self.skipped {
            return Vec::new();
        }
        let alias = self.alias.replace(' ', "_");
        let mut entries = vec![
            format!("{alias}_files={}", self.kept_files),
            format!("{alias}_size={}b", self.kept_bytes),
        ];
        if let Some(age) = self.newest_age_days {
            let threshold = self
                .warn_age_days
                .map(|w| format!(";{w}"))
                .unwrap_or_default();
            entries.push(format!("{alias}_age={age}{threshold}"));
            entries.push(format!("{alias}_deleted={}", self.deleted_total()));
        }
        entries
    }
}

/// Process-wide report folded from repository outcomes.
#[derive(Debug, Default)]
pub struct Report {
    severity: Severity,
    body: String,
    summary_alerts: String,
    perfdata: Vec<String>,
    repo_count: u64,
    total_files: u64,
    total_bytes: u64,
    total_deleted: u64,
}

impl Report {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one repository's outcome into the report.
    pub fn push(&mut self, outcome: &RepositoryOutcome) {
        self.severity = self.severity.worst(outcome.severity());
        self.repo_count += 1;
        self.body.push_str(&outcome.summary_line());
        if outcome.skipped {
            // Preflight failures surface in the first report line too.
            self.summary_alerts.push_str(&outcome.crit_text);
            return;
        }
        self.perfdata.extend(outcome.perfdata());
        self.total_files += outcome.kept_files;
        self.total_bytes += outcome.kept_bytes;
        self.total_deleted += outcome.deleted_total();
    }

    /// The worst severity seen so far.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The full report text: totals summary first, then one line per
    /// repository.
    #[must_use]
    pub fn text(&self) -> String {
        format!(
            "{}Total {} matching file{} with {} in {} backup repositor{}. {} file{} deleted. {}",
            self.summary_alerts,
            self.total_files,
            plural(self.total_files),
            humanize_size(self.total_bytes),
            self.repo_count,
            if self.repo_count == 1 { "y" } else { "ies" },
            self.total_deleted,
            plural(self.total_deleted),
            self.body,
        )
    }

    /// Ordered perfdata entries including the process-wide totals.
    #[must_use]
    pub fn perfdata(&self) -> Vec<String> {
        let mut entries = self.perfdata.clone();
        entries.push(format!("total_files={}", self.total_files));
        entries.push(format!("total_size={}b", self.total_bytes));
        entries.push(format!("total_deleted={}", self.total_deleted));
        entries
    }

    /// Perfdata entries joined into a single space-separated line.
    #[must_use]
    pub fn perfdata_line(&self) -> String {
        self.perfdata().join(" ")
    }
}
