use super::*;

fn sample_files() -> Vec<MigrationFile> {
    vec![
        MigrationFile::classified("schema/0001_init.sql", "CREATE TABLE t(id int);"),
        MigrationFile::classified("seed/roles.sql", "INSERT INTO t VALUES (1);"),
        MigrationFile::classified("custom/backfill.sql", "UPDATE t SET id = id;"),
        MigrationFile::classified("rollback/0001_init.sql", "DROP TABLE t;"),
    ]
}

#[test]
fn test_classify_paths() {
    assert_eq!(FileCategory::from_path("drizzle/0001.sql"), FileCategory::Schema);
    assert_eq!(FileCategory::from_path("schema/0001.sql"), FileCategory::Schema);
    assert_eq!(FileCategory::from_path("0001.sql"), FileCategory::Schema);
    assert_eq!(FileCategory::from_path("custom/a.sql"), FileCategory::Custom);
    assert_eq!(FileCategory::from_path("seeds/a.sql"), FileCategory::Seed);
    assert_eq!(FileCategory::from_path("down/a.sql"), FileCategory::Rollback);
}

#[test]
fn test_sql_rejects_invalid_utf8() {
    let ok = MigrationFile::classified("schema/0001.sql", "SELECT 'é';");
    assert_eq!(ok.sql().unwrap(), "SELECT 'é';");

    let bad = MigrationFile::classified("schema/0002.sql", b"SELECT 1;\xff\xfe".to_vec());
    match bad.sql().unwrap_err() {
        CoreError::InvalidEncoding { path, offset } => {
            assert_eq!(path, "schema/0002.sql");
            assert_eq!(offset, 9);
        }
        other => panic!("expected InvalidEncoding, got {other}"),
    }
}

#[test]
fn test_category_serde_accepts_drizzle_alias() {
    let parsed: FileCategory = serde_json::from_str("\"drizzle\"").unwrap();
    assert_eq!(parsed, FileCategory::Schema);
    assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"schema\"");
    assert_eq!("drizzle".parse::<FileCategory>().unwrap(), FileCategory::Schema);
}

#[test]
fn test_build_manifest_fields() {
    let version = Version::parse("1.0.0").unwrap();
    let metadata = ManifestMetadata {
        notes: "initial".to_string(),
        author: Some("dba".to_string()),
        ..Default::default()
    };
    let manifest = build_manifest(version.clone(), &sample_files(), metadata).unwrap();

    assert_eq!(manifest.version, version);
    assert_eq!(manifest.checksum_algorithm, "sha256");
    assert_eq!(manifest.files.len(), 4);
    assert_eq!(manifest.notes, "initial");
    assert_eq!(manifest.author.as_deref(), Some("dba"));
    assert!(manifest.signature.is_none());

    let init = manifest.file("schema/0001_init.sql").unwrap();
    assert_eq!(init.checksum, compute_file_digest(b"CREATE TABLE t(id int);"));
    assert_eq!(init.size, 23);
    assert_eq!(init.category, FileCategory::Schema);
    manifest.verify_aggregate().unwrap();
}

#[test]
fn test_build_manifest_is_order_independent() {
    let version = Version::parse("1.0.0").unwrap();
    let files = sample_files();
    let mut reversed = files.clone();
    reversed.reverse();

    let a = build_manifest(version.clone(), &files, ManifestMetadata::default()).unwrap();
    let b = build_manifest(version, &reversed, ManifestMetadata::default()).unwrap();

    assert_eq!(a.checksum, b.checksum);
    assert_eq!(a.files, b.files);
}

#[test]
fn test_build_manifest_rejects_duplicate_paths() {
    let files = vec![
        MigrationFile::classified("schema/a.sql", "SELECT 1;"),
        MigrationFile::classified("schema/a.sql", "SELECT 2;"),
    ];
    let err = build_manifest(
        Version::parse("1.0.0").unwrap(),
        &files,
        ManifestMetadata::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::DuplicatePath { .. }));
}

#[test]
fn test_tampered_digest_fails_aggregate() {
    let mut manifest = build_manifest(
        Version::parse("1.0.0").unwrap(),
        &sample_files(),
        ManifestMetadata::default(),
    )
    .unwrap();
    manifest.files[0].checksum = compute_file_digest(b"something else");

    let err = manifest.verify_aggregate().unwrap_err();
    assert!(matches!(err, CoreError::AggregateChecksumMismatch { .. }));
}

#[test]
fn test_files_in_category_sorted() {
    let files = vec![
        MigrationFile::classified("schema/0002.sql", "SELECT 2;"),
        MigrationFile::classified("schema/0001.sql", "SELECT 1;"),
        MigrationFile::classified("seed/a.sql", "SELECT 3;"),
    ];
    let manifest = build_manifest(
        Version::parse("1.0.0").unwrap(),
        &files,
        ManifestMetadata::default(),
    )
    .unwrap();

    let schema: Vec<&str> = manifest
        .files_in(FileCategory::Schema)
        .iter()
        .map(|f| f.path.as_str())
        .collect();
    assert_eq!(schema, vec!["schema/0001.sql", "schema/0002.sql"]);
    assert!(manifest.files_in(FileCategory::Rollback).is_empty());
}

#[test]
fn test_signing_payload_excludes_signature() {
    let mut manifest = build_manifest(
        Version::parse("1.0.0").unwrap(),
        &sample_files(),
        ManifestMetadata::default(),
    )
    .unwrap();
    let before = manifest.signing_payload().unwrap();

    manifest.signature = Some(SignatureBlock {
        algorithm: "ed25519".to_string(),
        public_key: "key".to_string(),
        signature: "sig".to_string(),
        provenance: None,
    });

    assert_eq!(manifest.signing_payload().unwrap(), before);
}

#[test]
fn test_json_roundtrip_preserves_manifest() {
    let manifest = build_manifest(
        Version::parse("2.1.0-rc.1").unwrap(),
        &sample_files(),
        ManifestMetadata {
            previous_version: Some(Version::parse("2.0.0").unwrap()),
            dependencies: vec![Version::parse("1.0.0").unwrap()],
            ..Default::default()
        },
    )
    .unwrap();

    let parsed = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
    assert_eq!(parsed, manifest);
}
