//! Configuration management.
//!
//! The configuration is a YAML file with a `logging` section and a list of
//! `backup_repository` entries. Raw serde shapes (`ConfigFile` and friends)
//! are resolved into validated runtime types with compiled glob matchers and
//! regexes; the resolved [`Config`] is immutable for the rest of the run.

use globset::{Glob, GlobMatcher};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Runtime configuration for one snapward run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Repositories, processed in configuration order.
    pub repositories: Vec<RepositoryConfig>,
}

/// Logging settings from the `logging` config section.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log level filter directive (`trace`..`error`).
    pub level: String,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Resolved per-repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Base directory holding the snapshot files.
    pub directory: PathBuf,
    /// Raw glob pattern, kept for messages.
    pub pattern: String,
    /// Compiled matcher for `pattern`.
    pub matcher: GlobMatcher,
    /// Display alias; defaults to the directory path.
    pub alias: String,
    /// Number of most recent snapshots retained in place. Absent means all
    /// files stay where they are.
    pub keep: Option<usize>,
    /// Warn when the newest snapshot is strictly older than this many days.
    pub warn_age_days: Option<i64>,
    /// Warn when the newest snapshot is strictly smaller than this.
    pub warn_bytes: Option<u64>,
    /// Ordered content compliance rules for the newest snapshot.
    pub compliance: Vec<ComplianceRule>,
    /// Comparison policy against the previous snapshot.
    pub compare: Option<CompareConfig>,
    /// Weekly archival tier.
    pub weekly: Option<TierConfig>,
    /// Monthly archival tier.
    pub monthly: Option<TierConfig>,
    /// Yearly archival tier.
    pub yearly: Option<TierConfig>,
    /// Overflow directory for files that fit no tier slot.
    pub move_old_to: Option<PathBuf>,
    /// strftime template for renaming moved files; `{}` expands to the
    /// original file name.
    pub rename_moved_files: Option<String>,
    /// Delete files that fit no destination instead of leaving them.
    pub delete_old: bool,
}

/// A regex-based content assertion against the newest snapshot.
#[derive(Debug, Clone)]
pub struct ComplianceRule {
    /// Raw pattern, kept for messages.
    pub pattern: String,
    /// Compiled multi-line regex.
    pub regex: Regex,
    /// Inverts the pass condition: a match becomes a violation.
    pub must_not_match: bool,
    /// Optional violation message; capture groups expand via `$1`/`${name}`.
    pub violation_message: Option<String>,
}

/// Policy for comparing the newest snapshot with the previous one.
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Warn when the two snapshots are byte-identical.
    pub warn_if_equal: bool,
    /// Warn when the newest snapshot has changed.
    pub warn_if_changed: bool,
    /// Delete the newest snapshot when it equals the previous one.
    pub delete_if_equal: bool,
    /// Together with `delete_if_equal`, also delete when the snapshots only
    /// differ in regions masked by `ignore_regex`.
    pub delete_if_ignored: bool,
    /// Suppress comparison reporting once the newest snapshot is older than
    /// this many days.
    pub warn_age_limit_days: Option<i64>,
    /// Regions matching this regex are masked before the second equality
    /// test.
    pub ignore_regex: Option<Regex>,
    /// Log a unified diff when the snapshots differ.
    pub log_diff: bool,
}

/// One weekly/monthly/yearly archival tier.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Tier directory; must pre-exist.
    pub directory: PathBuf,
    /// Files retained directly inside the tier.
    pub keep: usize,
}

/// Configuration file structure (for YAML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Repository list.
    pub backup_repository: Vec<ConfigFileRepository>,
}

/// Logging section in the config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Log level.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<PathBuf>,
}

/// One repository entry in the config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileRepository {
    /// Base directory.
    pub directory: PathBuf,
    /// Glob pattern for snapshot files.
    pub pattern: String,
    /// Display alias.
    pub alias: Option<String>,
    /// Keep count for the base directory.
    pub keep: Option<usize>,
    /// Freshness threshold in days.
    pub warn_age: Option<i64>,
    /// Minimum size threshold in bytes.
    pub warn_bytes: Option<u64>,
    /// Compliance rules.
    pub compliance_check: Option<Vec<ConfigFileComplianceRule>>,
    /// Comparison policy.
    pub compare_with_previous: Option<ConfigFileCompare>,
    /// Weekly tier.
    pub weekly: Option<ConfigFileTier>,
    /// Monthly tier.
    pub monthly: Option<ConfigFileTier>,
    /// Yearly tier.
    pub yearly: Option<ConfigFileTier>,
    /// Overflow directory.
    pub move_old_to: Option<PathBuf>,
    /// Rename template for moved files.
    pub rename_moved_files: Option<String>,
    /// Delete overflow instead of keeping it.
    pub delete_old: Option<bool>,
}

/// Compliance rule in the config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileComplianceRule {
    /// Regex pattern.
    pub regex: String,
    /// Invert the pass condition.
    pub must_not_match: Option<bool>,
    /// Violation message template.
    pub violation_message: Option<String>,
}

/// `compare_with_previous` section in the config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileCompare {
    /// Warn on equal snapshots.
    pub warn_if_equal: Option<bool>,
    /// Warn on changed snapshots.
    pub warn_if_changed: Option<bool>,
    /// Delete the newest snapshot when equal.
    pub delete_if_equal: Option<bool>,
    /// Also delete when equal after masking.
    pub delete_if_ignored: Option<bool>,
    /// Reporting age limit in days.
    pub warn_age_limit: Option<i64>,
    /// Mask regex.
    pub ignore_regex: Option<String>,
    /// Log a unified diff on change.
    pub log_diff: Option<bool>,
}

/// Tier section in the config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileTier {
    /// Tier directory.
    pub directory: PathBuf,
    /// Keep count inside the tier.
    pub keep: usize,
}

impl Config {
    /// Loads and resolves configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the file cannot be read or parsed,
    /// or if a pattern or regex fails to compile.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    /// Resolves configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on parse or validation failure.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml_ng::from_str(contents)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::from_config_file(file)
    }

    /// Converts a parsed `ConfigFile` into a resolved `Config`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut logging = LoggingSettings::default();
        if let Some(section) = file.logging {
            if let Some(level) = section.level {
                logging.level = level.to_lowercase();
            }
            logging.file = section.file;
        }

        let mut repositories = Vec::with_capacity(file.backup_repository.len());
        for repo in file.backup_repository {
            repositories.push(RepositoryConfig::from_config_file(repo)?);
        }

        Ok(Self {
            logging,
            repositories,
        })
    }
}

impl RepositoryConfig {
    fn from_config_file(raw: ConfigFileRepository) -> Result<Self> {
        let matcher = Glob::new(&raw.pattern)
            .map_err(|e| {
                Error::InvalidConfig(format!("invalid pattern '{}': {e}", raw.pattern))
            })?
            .compile_matcher();

        let alias = raw
            .alias
            .unwrap_or_else(|| raw.directory.display().to_string());

        let mut compliance = Vec::new();
        for rule in raw.compliance_check.unwrap_or_default() {
            compliance.push(ComplianceRule::from_config_file(rule)?);
        }

        let compare = raw
            .compare_with_previous
            .map(CompareConfig::from_config_file)
            .transpose()?;

        Ok(Self {
            directory: raw.directory,
            pattern: raw.pattern,
            matcher,
            alias,
            keep: raw.keep,
            warn_age_days: raw.warn_age,
            warn_bytes: raw.warn_bytes,
            compliance,
            compare,
            weekly: raw.weekly.map(ConfigFileTier::into_tier),
            monthly: raw.monthly.map(ConfigFileTier::into_tier),
            yearly: raw.yearly.map(ConfigFileTier::into_tier),
            move_old_to: raw.move_old_to,
            rename_moved_files: raw.rename_moved_files,
            delete_old: raw.delete_old.unwrap_or(false),
        })
    }
}

impl ComplianceRule {
    fn from_config_file(raw: ConfigFileComplianceRule) -> Result<Self> {
        let regex = compile_multiline(&raw.regex)?;
        Ok(Self {
            pattern: raw.regex,
            regex,
            must_not_match: raw.must_not_match.unwrap_or(false),
            violation_message: raw.violation_message,
        })
    }
}

impl CompareConfig {
    fn from_config_file(raw: ConfigFileCompare) -> Result<Self> {
        let ignore_regex = raw
            .ignore_regex
            .as_deref()
            .map(compile_multiline)
            .transpose()?;
        Ok(Self {
            warn_if_equal: raw.warn_if_equal.unwrap_or(false),
            warn_if_changed: raw.warn_if_changed.unwrap_or(false),
            delete_if_equal: raw.delete_if_equal.unwrap_or(false),
            delete_if_ignored: raw.delete_if_ignored.unwrap_or(false),
            warn_age_limit_days: raw.warn_age_limit,
            ignore_regex,
            log_diff: raw.log_diff.unwrap_or(false),
        })
    }
}

impl ConfigFileTier {
    fn into_tier(self) -> TierConfig {
        TierConfig {
            directory: self.directory,
            keep: self.keep,
        }
    }
}

fn compile_multiline(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| Error::InvalidConfig(format!("invalid regex '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
logging:
  level: debug
backup_repository:
  - directory: /srv/backup/fw
    pattern: "*.cfg"
    alias: firewall
    keep: 7
    warn_age: 1
    warn_bytes: 1024
    compliance_check:
      - regex: "^hostname fw"
      - regex: "password"
        must_not_match: true
        violation_message: "cleartext password found"
    compare_with_previous:
      warn_if_changed: true
      log_diff: true
    weekly:
      directory: /srv/backup/fw/weekly
      keep: 5
    move_old_to: /srv/backup/fw/old
    delete_old: true
"#;

    #[test]
    fn test_parse_full_repository() {
        let config = Config::from_yaml(SAMPLE).expect("sample config should parse");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.repositories.len(), 1);

        let repo = &config.repositories[0];
        assert_eq!(repo.alias, "firewall");
        assert_eq!(repo.keep, Some(7));
        assert_eq!(repo.warn_age_days, Some(1));
        assert_eq!(repo.warn_bytes, Some(1024));
        assert_eq!(repo.compliance.len(), 2);
        assert!(!repo.compliance[0].must_not_match);
        assert!(repo.compliance[1].must_not_match);
        assert!(repo.delete_old);

        let compare = repo.compare.as_ref().expect("compare config");
        assert!(compare.warn_if_changed);
        assert!(compare.log_diff);
        assert!(!compare.warn_if_equal);

        let weekly = repo.weekly.as_ref().expect("weekly tier");
        assert_eq!(weekly.keep, 5);
        assert!(repo.monthly.is_none());
        assert!(repo.yearly.is_none());
    }

    #[test]
    fn test_alias_defaults_to_directory() {
        let yaml = r#"
backup_repository:
  - directory: /srv/backup/plain
    pattern: "*"
"#;
        let config = Config::from_yaml(yaml).expect("minimal config should parse");
        let repo = &config.repositories[0];
        assert_eq!(repo.alias, "/srv/backup/plain");
        assert!(repo.keep.is_none());
        assert!(!repo.delete_old);
        assert!(repo.compliance.is_empty());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let yaml = r#"
backup_repository:
  - directory: /srv/backup
    pattern: "*"
    compliance_check:
      - regex: "([unclosed"
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_repository_key_rejected() {
        let yaml = r#"
backup_repository:
  - directory: /srv/backup
    pattern: "*"
    warn_days: 3
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_compliance_defaults() {
        let yaml = r#"
backup_repository:
  - directory: /srv/backup
    pattern: "*.dump"
    compliance_check:
      - regex: "^-- Dump completed"
"#;
        let config = Config::from_yaml(yaml).expect("config should parse");
        let rule = &config.repositories[0].compliance[0];
        assert!(!rule.must_not_match);
        assert!(rule.violation_message.is_none());
        // Multi-line mode: ^ matches at line starts.
        assert!(rule.regex.is_match("header\n-- Dump completed at noon"));
    }
}
