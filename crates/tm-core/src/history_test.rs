use super::*;
use chrono::{Duration, TimeZone};

fn row(version: &str, minute: i64, success: bool, rollback_of: Option<&str>) -> AppliedVersion {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    AppliedVersion {
        id: format!("{}-{}", version, minute),
        version: version.to_string(),
        checksum: "abc".to_string(),
        applied_at: base + Duration::minutes(minute),
        applied_by: "ci".to_string(),
        success,
        error: if success { None } else { Some("boom".to_string()) },
        rollback_of: rollback_of.map(String::from),
        manifest: None,
        is_system: false,
    }
}

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[test]
fn test_empty_history() {
    let history = EffectiveHistory::replay(&[]);
    assert!(history.current().is_none());
    assert!(history.applied().is_empty());
}

#[test]
fn test_current_is_latest_successful_apply() {
    let records = vec![
        row("1.0.0", 1, true, None),
        row("1.1.0", 2, true, None),
        row("1.2.0", 3, false, None),
    ];
    let history = EffectiveHistory::replay(&records);

    assert_eq!(history.current(), Some(&v("1.1.0")));
    assert!(history.is_applied(&v("1.0.0")));
    assert!(!history.is_applied(&v("1.2.0")));
}

#[test]
fn test_replay_orders_by_timestamp() {
    let records = vec![row("1.1.0", 5, true, None), row("1.0.0", 1, true, None)];
    let history = EffectiveHistory::replay(&records);
    assert_eq!(history.current(), Some(&v("1.1.0")));
    assert_eq!(history.applied(), &[v("1.0.0"), v("1.1.0")]);
}

#[test]
fn test_retry_after_failure_counts_once() {
    let records = vec![
        row("1.0.0", 1, false, None),
        row("1.0.0", 2, true, None),
    ];
    let history = EffectiveHistory::replay(&records);
    assert_eq!(history.applied(), &[v("1.0.0")]);
}

#[test]
fn test_rollback_removes_version() {
    let records = vec![
        row("1.0.0", 1, true, None),
        row("1.1.0", 2, true, None),
        row("1.1.0", 3, true, Some("1.1.0")),
    ];
    let history = EffectiveHistory::replay(&records);

    assert_eq!(history.current(), Some(&v("1.0.0")));
    assert!(!history.is_applied(&v("1.1.0")));
}

#[test]
fn test_failed_rollback_changes_nothing() {
    let records = vec![
        row("1.0.0", 1, true, None),
        row("1.0.0", 2, false, Some("1.0.0")),
    ];
    let history = EffectiveHistory::replay(&records);
    assert!(history.is_applied(&v("1.0.0")));
}

#[test]
fn test_system_rows_ignored() {
    let mut system = row(SYSTEM_VERSION, 0, true, None);
    system.is_system = true;
    let history = EffectiveHistory::replay(&[system]);
    assert!(history.current().is_none());
}
