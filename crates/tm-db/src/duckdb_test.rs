use super::*;
use chrono::Utc;

const WAIT: Duration = Duration::from_secs(5);

fn record(version: &str, success: bool) -> AppliedVersion {
    AppliedVersion {
        id: uuid::Uuid::new_v4().to_string(),
        version: version.to_string(),
        checksum: "abc123".to_string(),
        applied_at: Utc::now(),
        applied_by: "tester".to_string(),
        success,
        error: (!success).then(|| "boom".to_string()),
        rollback_of: None,
        manifest: Some("{}".to_string()),
        is_system: false,
    }
}

#[tokio::test]
async fn test_bootstrap_creates_tables_and_system_row() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(db.relation_exists(ledger::LEDGER_TABLE).await.unwrap());
    assert!(db.relation_exists(lock::LOCK_TABLE).await.unwrap());

    let rows = db.applied_versions().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_system);
    assert_eq!(rows[0].version, tm_core::SYSTEM_VERSION);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("ledger.duckdb");

    {
        let db = DuckDbBackend::from_path(&path).unwrap();
        db.record_version(&record("0.1.0", true)).await.unwrap();
    }

    let db = DuckDbBackend::from_path(&path).unwrap();
    let rows = db.applied_versions().await.unwrap();
    assert_eq!(rows.iter().filter(|r| r.is_system).count(), 1);
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_record_roundtrip_preserves_order() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.record_version(&record("0.1.0", true)).await.unwrap();
    db.record_version(&record("0.2.0", false)).await.unwrap();
    let mut rollback = record("0.1.0", true);
    rollback.rollback_of = Some("0.1.0".to_string());
    db.record_version(&rollback).await.unwrap();

    let rows = db.applied_versions().await.unwrap();
    let versions: Vec<_> = rows.iter().skip(1).map(|r| r.version.as_str()).collect();
    assert_eq!(versions, vec!["0.1.0", "0.2.0", "0.1.0"]);
    assert!(!rows[2].success);
    assert_eq!(rows[2].error.as_deref(), Some("boom"));
    assert_eq!(rows[3].rollback_of.as_deref(), Some("0.1.0"));
    assert_eq!(rows[1].manifest.as_deref(), Some("{}"));
}

#[tokio::test]
async fn test_query_count() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch("CREATE TABLE nums AS SELECT * FROM range(10) t(n)")
        .await
        .unwrap();

    let count = db.query_count("SELECT * FROM nums").await.unwrap();
    assert_eq!(count, 10);
}

#[tokio::test]
async fn test_query_rows_with_params() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE users (id INT, name VARCHAR); INSERT INTO users VALUES (1, 'ada'), (2, NULL);",
    )
    .await
    .unwrap();

    let rows = db
        .query_rows("SELECT id, name FROM users WHERE id >= CAST(? AS INT) ORDER BY id", &["1"])
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Some("1".to_string()), Some("ada".to_string())],
            vec![Some("2".to_string()), None],
        ]
    );
}

#[tokio::test]
async fn test_relation_not_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.relation_exists("nonexistent").await.unwrap());
}

#[tokio::test]
async fn test_transaction_commit_persists_ddl_and_ledger_row() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut tx = db.begin().await.unwrap();
    tx.execute_batch("CREATE TABLE users (id INT)").await.unwrap();
    tx.record_version(&record("0.1.0", true)).await.unwrap();
    tx.commit().await.unwrap();

    assert!(db.relation_exists("users").await.unwrap());
    assert_eq!(db.applied_versions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_transaction_rollback_discards_ddl_and_ledger_row() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut tx = db.begin().await.unwrap();
    tx.execute_batch("CREATE TABLE users (id INT); CREATE TABLE posts (id INT);")
        .await
        .unwrap();
    tx.record_version(&record("0.1.0", true)).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(!db.relation_exists("users").await.unwrap());
    assert!(!db.relation_exists("posts").await.unwrap());
    assert_eq!(db.applied_versions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dropped_transaction_rolls_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    {
        let mut tx = db.begin().await.unwrap();
        tx.execute_batch("CREATE TABLE users (id INT)").await.unwrap();
    }
    assert!(!db.relation_exists("users").await.unwrap());
}

#[tokio::test]
async fn test_uncommitted_work_is_invisible_outside_transaction() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut tx = db.begin().await.unwrap();
    tx.execute_batch("CREATE TABLE users (id INT)").await.unwrap();

    assert!(!db.relation_exists("users").await.unwrap());
    tx.commit().await.unwrap();
    assert!(db.relation_exists("users").await.unwrap());
}

#[tokio::test]
async fn test_lock_is_exclusive() {
    let db = DuckDbBackend::in_memory().unwrap().with_holder("first");
    let handle = db.try_lock("migrations", WAIT).await.unwrap();
    assert_eq!(handle.key(), "migrations");

    let err = db.try_lock("migrations", WAIT).await.unwrap_err();
    match err {
        DbError::LockHeld { key, holder } => {
            assert_eq!(key, "migrations");
            assert_eq!(holder, "first");
        }
        other => panic!("expected LockHeld, got {other}"),
    }

    handle.release().unwrap();
}

#[tokio::test]
async fn test_lock_release_allows_reacquire() {
    let db = DuckDbBackend::in_memory().unwrap();
    let handle = db.try_lock("migrations", WAIT).await.unwrap();
    handle.release().unwrap();
    assert_eq!(db.lock_holder("migrations").unwrap(), None);

    let again = db.try_lock("migrations", WAIT).await.unwrap();
    again.release().unwrap();
}

#[tokio::test]
async fn test_lock_released_on_drop() {
    let db = DuckDbBackend::in_memory().unwrap().with_holder("dropper");
    {
        let _handle = db.try_lock("migrations", WAIT).await.unwrap();
        assert_eq!(db.lock_holder("migrations").unwrap().as_deref(), Some("dropper"));
    }
    assert_eq!(db.lock_holder("migrations").unwrap(), None);
}

#[tokio::test]
async fn test_distinct_keys_do_not_conflict() {
    let db = DuckDbBackend::in_memory().unwrap();
    let a = db.try_lock("a", WAIT).await.unwrap();
    let b = db.try_lock("b", WAIT).await.unwrap();
    a.release().unwrap();
    b.release().unwrap();
}

#[tokio::test]
async fn test_expired_lock_is_taken_over() {
    let db = DuckDbBackend::in_memory()
        .unwrap()
        .with_holder("crashed")
        .with_lock_lease(Duration::from_millis(1));
    let stale = db.try_lock("migrations", WAIT).await.unwrap();
    std::mem::forget(stale);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let db = db.with_holder("rescuer").with_lock_lease(DEFAULT_LOCK_LEASE);
    let handle = db.try_lock("migrations", WAIT).await.unwrap();
    assert_eq!(db.lock_holder("migrations").unwrap().as_deref(), Some("rescuer"));
    handle.release().unwrap();
}

#[tokio::test]
async fn test_stale_handle_does_not_release_new_owner() {
    let db = DuckDbBackend::in_memory()
        .unwrap()
        .with_holder("old")
        .with_lock_lease(Duration::from_millis(1));
    let stale = db.try_lock("migrations", WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let db = db.with_holder("new").with_lock_lease(DEFAULT_LOCK_LEASE);
    let current = db.try_lock("migrations", WAIT).await.unwrap();

    stale.release().unwrap();
    assert_eq!(db.lock_holder("migrations").unwrap().as_deref(), Some("new"));
    current.release().unwrap();
}

const SLOW_SQL: &str = "CREATE TABLE slow AS \
     SELECT count(*) AS n FROM range(40000) a, range(40000) b WHERE (a.range * b.range) % 7 = 3";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_statement_is_interrupted() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut tx = db.begin().await.unwrap();

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_millis(100), tx.execute_batch(SLOW_SQL)).await;
    assert!(result.is_err(), "statement should outlive the timeout");

    tx.rollback().await.unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "rollback waited {:?} for the statement",
        started.elapsed()
    );
    assert!(!db.relation_exists("slow").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finished_statement_is_not_interrupted() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut tx = db.begin().await.unwrap();
    tx.execute_batch("CREATE TABLE first (id INT)").await.unwrap();
    tx.execute_batch("CREATE TABLE second (id INT)").await.unwrap();
    tx.commit().await.unwrap();

    assert!(db.relation_exists("first").await.unwrap());
    assert!(db.relation_exists("second").await.unwrap());
}
