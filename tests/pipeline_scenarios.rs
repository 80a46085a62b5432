//! End-to-end pipeline scenarios running the full audit over temporary
//! repositories.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::too_many_lines)]

use chrono::Utc;
use snapward::config::Config;
use snapward::report::Severity;
use snapward::runner::{self, process_repository};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Writes `content` to `dir/name` and backdates its mtime by `age`.
fn write_aged(dir: &Path, name: &str, content: &[u8], age: Duration) {
    let path = dir.join(name);
    fs::write(&path, content).expect("write file");
    let file = fs::File::options().append(true).open(&path).expect("open");
    file.set_modified(SystemTime::now() - age)
        .expect("set mtime");
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(3600 * n)
}

fn days(n: u64) -> Duration {
    Duration::from_secs(86400 * n)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[test]
fn test_keep_count_deletes_oldest_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..5 {
        write_aged(dir.path(), &format!("dump_{i}.sql"), b"data", hours(5 - i as u64));
    }

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"dump_*.sql\"\n    alias: db\n    keep: 2\n    delete_old: true\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Ok);
    assert_eq!(report.severity().exit_code(), 0);
    // The two newest files survive, the three oldest are gone.
    assert_eq!(file_names(dir.path()), vec!["dump_3.sql", "dump_4.sql"]);

    let perfdata = report.perfdata_line();
    assert!(perfdata.contains("db_files=2"));
    assert!(perfdata.contains("db_deleted=3"));
    assert!(perfdata.contains("total_deleted=3"));
}

#[test]
fn test_stale_newest_file_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "backup.tar", b"payload", days(10));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.tar\"\n    alias: archive\n    warn_age: 2\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Warning);
    assert_eq!(report.severity().exit_code(), 1);
    assert!(report.text().contains("older than defined warn_age"));
    // Age perfdata carries the configured threshold.
    assert!(report.perfdata_line().contains("archive_age=10;2"));
}

#[test]
fn test_missing_directory_is_critical_but_others_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "ok.cfg", b"config", hours(1));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: /nonexistent/backups\n    pattern: \"*\"\n    alias: broken\n  - directory: {}\n    pattern: \"*.cfg\"\n    alias: good\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Critical);
    assert_eq!(report.severity().exit_code(), 2);
    // The preflight failure leads the report; the healthy repository still
    // contributes its counters.
    assert!(report
        .text()
        .starts_with("Directory '/nonexistent/backups' not found."));
    assert!(report.perfdata_line().contains("good_files=1"));
    assert!(dir.path().join("ok.cfg").exists());
}

#[test]
fn test_compliance_violation_is_critical() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "status.txt", b"FAIL", hours(1));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.txt\"\n    alias: status\n    compliance_check:\n      - regex: \"^OK$\"\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Critical);
    assert!(report
        .text()
        .contains("Compliance violation in file 'status.txt': Does not match regex '^OK$'."));
}

#[test]
fn test_equal_snapshot_deleted_and_excluded_from_retention() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "a.dump", b"same bytes", hours(26));
    write_aged(dir.path(), "b.dump", b"same bytes", hours(2));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.dump\"\n    alias: db\n    keep: 1\n    delete_old: true\n    compare_with_previous:\n      delete_if_equal: true\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Ok);
    // The duplicate newest file is removed; the older one then fills the
    // keep slot instead of being routed to deletion.
    assert_eq!(file_names(dir.path()), vec!["a.dump"]);
    assert!(report.text().contains(
        "was deleted, because there were no changes compared to previous file"
    ));
    assert!(report.perfdata_line().contains("db_deleted=1"));
}

#[test]
fn test_second_file_in_same_week_falls_through_to_overflow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let weekly = dir.path().join("weekly");
    let overflow = dir.path().join("old");
    fs::create_dir(&weekly).expect("mkdir weekly");
    fs::create_dir(&overflow).expect("mkdir overflow");

    // Same ISO week, hours apart. Both are beyond the keep count.
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_755_000_000);
    for (name, offset) in [("first.cfg", 0), ("second.cfg", 3600)] {
        let path = dir.path().join(name);
        fs::write(&path, name).expect("write");
        let file = fs::File::options().append(true).open(&path).expect("open");
        file.set_modified(base + Duration::from_secs(offset))
            .expect("set mtime");
    }

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.cfg\"\n    alias: fw\n    keep: 0\n    weekly:\n      directory: {}\n      keep: 5\n    move_old_to: {}\n",
        dir.path().display(),
        weekly.display(),
        overflow.display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Ok);
    // The older file claims the week's tier slot; the newer one overflows.
    assert!(weekly.join("first.cfg").exists());
    assert!(overflow.join("second.cfg").exists());
    assert!(!dir.path().join("first.cfg").exists());
    assert!(!dir.path().join("second.cfg").exists());
}

#[test]
fn test_second_run_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let weekly = dir.path().join("weekly");
    fs::create_dir(&weekly).expect("mkdir weekly");
    for i in 0..4 {
        write_aged(dir.path(), &format!("cfg_{i}"), b"x", days(10 * (4 - i as u64)));
    }

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"cfg_*\"\n    alias: fw\n    keep: 2\n    weekly:\n      directory: {}\n      keep: 10\n    delete_old: true\n",
        dir.path().display(),
        weekly.display()
    ))
    .expect("config");

    let first = runner::run(&config);
    assert_eq!(first.severity(), Severity::Ok);
    let base_after_first = file_names(dir.path());
    let weekly_after_first = file_names(&weekly);

    let second = runner::run(&config);
    assert_eq!(second.severity(), Severity::Ok);
    assert_eq!(file_names(dir.path()), base_after_first);
    assert_eq!(file_names(&weekly), weekly_after_first);
    assert!(second.perfdata_line().contains("fw_deleted=0"));
}

#[test]
fn test_ignore_regex_masks_volatile_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(
        dir.path(),
        "old.cfg",
        b"hostname fw\n# saved at 10:00\nline two\n",
        hours(25),
    );
    write_aged(
        dir.path(),
        "new.cfg",
        b"hostname fw\n# saved at 11:30\nline two\n",
        hours(1),
    );

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.cfg\"\n    alias: fw\n    compare_with_previous:\n      warn_if_changed: true\n      ignore_regex: \"^# saved at .*$\"\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    // Only the masked timestamp line changed, so no warning is raised.
    assert_eq!(report.severity(), Severity::Ok);
    assert_eq!(file_names(dir.path()), vec!["new.cfg", "old.cfg"]);
}

#[test]
fn test_lock_file_ignored_by_wildcard_pattern() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "only.bak", b"data", hours(1));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*\"\n    alias: all\n    keep: 1\n    delete_old: true\n",
        dir.path().display()
    ))
    .expect("config");

    let report = runner::run(&config);
    assert_eq!(report.severity(), Severity::Ok);
    // The advisory lock never counts as a snapshot and never gets deleted
    // mid-run.
    assert!(report.perfdata_line().contains("all_files=1"));
    assert_eq!(file_names(dir.path()), vec!["only.bak"]);
}

#[test]
fn test_outcome_counters_for_mixed_policy() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_aged(dir.path(), "w1.sql", b"0123456789", hours(30));
    write_aged(dir.path(), "w2.sql", b"0123456789", hours(3));

    let config = Config::from_yaml(&format!(
        "backup_repository:\n  - directory: {}\n    pattern: \"*.sql\"\n    alias: mixed\n    warn_bytes: 5\n",
        dir.path().display()
    ))
    .expect("config");

    let outcome = process_repository(&config.repositories[0], Utc::now());
    assert!(!outcome.skipped);
    assert_eq!(outcome.kept_files, 2);
    assert_eq!(outcome.kept_bytes, 20);
    assert_eq!(outcome.newest_age_days, Some(0));
    assert_eq!(outcome.deleted_total(), 0);
    assert_eq!(outcome.severity(), Severity::Ok);
}
