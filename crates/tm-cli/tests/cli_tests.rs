//! End-to-end tests driving the `tidemark` binary against a temp project

use std::fs;
use std::path::Path;
use std::process::Command;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Run `tidemark` in `project` and return (stdout, stderr, success).
fn run_tidemark(project: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_tidemark"))
        .arg("--project-dir")
        .arg(project)
        .args(args)
        .env_remove("TIDEMARK_DATABASE")
        .env("TIDEMARK_ACTOR", "cli-test")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute tidemark with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn run_json(project: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.push("--json");
    let (stdout, stderr, ok) = run_tidemark(project, &full);
    assert!(ok, "tidemark {:?} failed: {}", args, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON from {:?}: {}\n{}", args, e, stdout))
}

fn write_sql(project: &Path, rel: &str, sql: &str) {
    let path = project.join("migrations").join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, sql).unwrap();
}

/// Initialized project with one schema, seed and rollback file
fn scaffolded_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, ok) = run_tidemark(dir.path(), &["init", "--name", "shop"]);
    assert!(ok, "init failed: {}", stderr);

    write_sql(
        dir.path(),
        "schema/0001_users.sql",
        "CREATE TABLE users (id INTEGER, name VARCHAR);",
    );
    write_sql(dir.path(), "seed/0001_users.sql", "INSERT INTO users VALUES (1, 'ada');");
    write_sql(dir.path(), "rollback/0001_users.sql", "DROP TABLE users;");
    dir
}

// ── Init ────────────────────────────────────────────────────────────────

#[test]
fn test_init_scaffolds_project() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, ok) = run_tidemark(dir.path(), &["init", "--name", "shop"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Initialized Tidemark project: shop"));

    assert!(dir.path().join("tidemark.yml").is_file());
    for sub in ["schema", "custom", "seed", "rollback"] {
        assert!(dir.path().join("migrations").join(sub).is_dir(), "missing {}", sub);
    }
    let config = fs::read_to_string(dir.path().join("tidemark.yml")).unwrap();
    assert!(config.contains("name: \"shop\""));
    assert!(!config.contains("key_path"));
}

#[test]
fn test_init_refuses_existing_config() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, ok) = run_tidemark(dir.path(), &["init"]);
    assert!(ok);
    let (_, stderr, ok) = run_tidemark(dir.path(), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);
}

#[test]
fn test_init_with_signing_writes_key() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, stderr, ok) = run_tidemark(dir.path(), &["init", "--signing"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Signing public key:"));
    assert!(dir.path().join(".tidemark/signing.key").is_file());

    let config = fs::read_to_string(dir.path().join("tidemark.yml")).unwrap();
    assert!(config.contains("key_path: .tidemark/signing.key"));
}

// ── Build / list / verify ───────────────────────────────────────────────

#[test]
fn test_build_and_list() {
    let dir = scaffolded_project();

    let built = run_json(dir.path(), &["build", "--version", "1.0.0", "--notes", "users"]);
    assert_eq!(built["version"], "1.0.0");
    assert_eq!(built["files"], 3);
    assert_eq!(built["signed"], false);

    let bumped = run_json(dir.path(), &["build", "--bump", "minor"]);
    assert_eq!(bumped["version"], "1.1.0");

    let listed = run_json(dir.path(), &["list"]);
    assert_eq!(listed, serde_json::json!(["1.0.0", "1.1.0"]));
}

#[test]
fn test_build_refuses_existing_version() {
    let dir = scaffolded_project();
    run_json(dir.path(), &["build", "--version", "1.0.0"]);

    let (_, stderr, ok) = run_tidemark(dir.path(), &["build", "--version", "1.0.0"]);
    assert!(!ok);
    assert!(stderr.contains("1.0.0"), "stderr: {}", stderr);
}

#[test]
fn test_build_without_sql_files_fails() {
    let dir = tempfile::tempdir().unwrap();
    run_tidemark(dir.path(), &["init"]);
    let (_, stderr, ok) = run_tidemark(dir.path(), &["build", "--version", "1.0.0"]);
    assert!(!ok);
    assert!(stderr.contains("No .sql files"), "stderr: {}", stderr);
}

#[test]
fn test_signed_build_verifies() {
    let dir = tempfile::tempdir().unwrap();
    run_tidemark(dir.path(), &["init", "--signing"]);
    write_sql(dir.path(), "schema/0001.sql", "CREATE TABLE t (id INTEGER);");

    let built = run_json(dir.path(), &["build", "--version", "0.1.0"]);
    assert_eq!(built["signed"], true);

    let report = run_json(dir.path(), &["verify", "0.1.0"]);
    assert_eq!(report["signature_checked"], true);
    assert_eq!(report["errors"], serde_json::json!([]));
}

#[test]
fn test_verify_tampered_archive_exits_nonzero() {
    let dir = scaffolded_project();
    run_json(dir.path(), &["build", "--version", "1.0.0"]);

    let archive = dir.path().join(".tidemark/artifacts/1.0.0/artifact.tmk");
    let mut bytes = fs::read(&archive).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&archive, bytes).unwrap();

    let (stdout, _, ok) = run_tidemark(dir.path(), &["verify", "1.0.0"]);
    assert!(!ok);
    assert!(stdout.contains("problem"), "stdout: {}", stdout);
}

// ── Apply / rollback / status ───────────────────────────────────────────

#[test]
fn test_apply_status_and_rollback() {
    let dir = scaffolded_project();
    run_json(dir.path(), &["build", "--version", "1.0.0"]);

    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["current"], serde_json::Value::Null);
    assert_eq!(status["pending"], serde_json::json!(["1.0.0"]));

    let applied = run_json(dir.path(), &["apply", "1.0.0"]);
    assert_eq!(applied["state"], "done");
    assert_eq!(applied["executed"], 2);

    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["current"], "1.0.0");
    assert_eq!(status["pending"], serde_json::json!([]));
    assert_eq!(status["history"][0]["applied_by"], "cli-test");

    let (_, stderr, ok) = run_tidemark(dir.path(), &["apply", "1.0.0"]);
    assert!(!ok);
    assert!(stderr.contains("already applied"), "stderr: {}", stderr);

    let rolled = run_json(dir.path(), &["rollback", "1.0.0"]);
    assert_eq!(rolled["operation"], "rollback");
    assert_eq!(rolled["executed"], 1);

    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["current"], serde_json::Value::Null);
    assert_eq!(status["history"].as_array().unwrap().len(), 2);
}

#[test]
fn test_apply_dry_run_leaves_database_untouched() {
    let dir = scaffolded_project();
    run_json(dir.path(), &["build", "--version", "1.0.0"]);

    let (stdout, stderr, ok) = run_tidemark(dir.path(), &["apply", "1.0.0", "--dry-run"]);
    assert!(ok, "dry run failed: {}", stderr);
    assert!(stdout.contains("nothing executed"), "stdout: {}", stdout);
    assert!(stdout.contains("schema/0001_users.sql"));
    assert!(!stdout.contains("rollback/0001_users.sql"));

    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["history"], serde_json::json!([]));
}

#[test]
fn test_failed_apply_is_recorded() {
    let dir = scaffolded_project();
    write_sql(dir.path(), "seed/0002_broken.sql", "INSERT INTO missing_table VALUES (1);");
    run_json(dir.path(), &["build", "--version", "1.0.0"]);

    let (_, _, ok) = run_tidemark(dir.path(), &["apply", "1.0.0"]);
    assert!(!ok);

    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["current"], serde_json::Value::Null);
    assert_eq!(status["history"][0]["success"], false);
    assert!(status["history"][0]["error"].as_str().unwrap().contains("seed/0002_broken.sql"));
}

#[test]
fn test_missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, ok) = run_tidemark(dir.path(), &["status"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to load project configuration"), "stderr: {}", stderr);
}
