use super::*;
use crate::manifest::{build_manifest, ManifestMetadata};
use crate::version::Version;

fn files() -> Vec<MigrationFile> {
    vec![
        MigrationFile::classified("schema/0001_init.sql", "CREATE TABLE t(id int);"),
        MigrationFile::classified("schema/0002_more.sql", "CREATE TABLE u(id int);"),
        MigrationFile::classified("seed/t.sql", "INSERT INTO t VALUES (1), (2);"),
    ]
}

fn manifest_for(files: &[MigrationFile]) -> Manifest {
    build_manifest(
        Version::parse("1.0.0").unwrap(),
        files,
        ManifestMetadata::default(),
    )
    .unwrap()
}

#[test]
fn test_encode_decode_preserves_content() {
    let files = files();
    let manifest = manifest_for(&files);
    let bytes = encode(&manifest, &files).unwrap();

    let (decoded_manifest, decoded_files) = decode(&bytes).unwrap();
    assert_eq!(decoded_manifest, manifest);

    let mut expected = files.clone();
    expected.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(decoded_files, expected);
}

#[test]
fn test_flipping_any_content_byte_is_detected() {
    let original = files();
    let manifest = manifest_for(&original);
    let content_len = original[0].content.len();

    for index in 0..content_len {
        let mut tampered = original.clone();
        tampered[0].content[index] ^= 0x01;
        let bytes = encode(&manifest, &tampered).unwrap();

        match decode(&bytes) {
            Err(CoreError::FileChecksumMismatch { path, .. }) => {
                assert_eq!(path, "schema/0001_init.sql")
            }
            other => panic!("byte {}: expected checksum mismatch, got {:?}", index, other),
        }
    }
}

#[test]
fn test_changed_recorded_digest_is_detected() {
    let files = files();
    let mut manifest = manifest_for(&files);
    manifest.files[1].checksum = crate::checksum::compute_file_digest(b"DROP TABLE t;");
    let bytes = encode(&manifest, &files).unwrap();

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, CoreError::FileChecksumMismatch { .. }));
    assert!(err.is_integrity_failure());
}

#[test]
fn test_changed_aggregate_is_detected() {
    let files = files();
    let mut manifest = manifest_for(&files);
    manifest.checksum = crate::checksum::compute_checksum("forged");
    let bytes = encode(&manifest, &files).unwrap();

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, CoreError::AggregateChecksumMismatch { .. }));
}

#[test]
fn test_dropped_manifest_entry_is_detected() {
    // Remove a file from both the manifest list and the archive, leaving the
    // aggregate untouched: per-file checks pass, the aggregate must not.
    let mut files = files();
    let mut manifest = manifest_for(&files);
    manifest.files.retain(|f| f.path != "seed/t.sql");
    files.retain(|f| f.path != "seed/t.sql");
    let bytes = encode(&manifest, &files).unwrap();

    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, CoreError::AggregateChecksumMismatch { .. }));
}

#[test]
fn test_encode_requires_every_manifest_file() {
    let mut files = files();
    let manifest = manifest_for(&files);
    files.pop();

    let err = encode(&manifest, &files).unwrap_err();
    assert!(matches!(err, CoreError::MissingArchiveEntry { .. }));
}

#[test]
fn test_encode_rejects_unlisted_file() {
    let mut files = files();
    let manifest = manifest_for(&files);
    files.push(MigrationFile::classified("schema/9999_extra.sql", "SELECT 1;"));

    let err = encode(&manifest, &files).unwrap_err();
    assert!(matches!(err, CoreError::UnexpectedArchiveEntry { .. }));
}

#[test]
fn test_garbage_is_malformed() {
    let err = decode(b"definitely not an artifact").unwrap_err();
    assert!(matches!(err, CoreError::MalformedArchive(_)));
}

#[test]
fn test_wrong_magic_is_malformed() {
    let compressed = zstd::encode_all(&b"NOTMAGIC\x00\x00\x00\x00"[..], 3).unwrap();
    let err = decode(&compressed).unwrap_err();
    assert!(matches!(err, CoreError::MalformedArchive(_)));
}

#[test]
fn test_oversized_manifest_length_is_malformed() {
    let mut raw = MAGIC.to_vec();
    raw.extend_from_slice(&u32::MAX.to_be_bytes());
    raw.extend_from_slice(b"{\"version\":");
    let compressed = zstd::encode_all(&raw[..], 3).unwrap();

    match decode(&compressed).unwrap_err() {
        CoreError::MalformedArchive(message) => assert!(message.contains("manifest truncated")),
        other => panic!("expected MalformedArchive, got {other}"),
    }
}

#[test]
fn test_truncated_archive_is_malformed() {
    let files = files();
    let manifest = manifest_for(&files);
    let bytes = encode(&manifest, &files).unwrap();

    let raw = zstd::decode_all(&bytes[..]).unwrap();
    let truncated = zstd::encode_all(&raw[..raw.len() - 5], 3).unwrap();

    let err = decode(&truncated).unwrap_err();
    assert!(matches!(err, CoreError::MalformedArchive(_)));
}

#[test]
fn test_unverified_decode_accepts_tampered_content() {
    let original = files();
    let manifest = manifest_for(&original);
    let mut tampered = original.clone();
    tampered[0].content = b"CREATE TABLE evil(id int);".to_vec();
    let bytes = encode(&manifest, &tampered).unwrap();

    assert!(decode(&bytes).is_err());
    let (_, decoded) = decode_unverified(&bytes).unwrap();
    assert_eq!(decoded[0].content, b"CREATE TABLE evil(id int);".to_vec());
}

#[test]
fn test_streaming_entries_into_sink() {
    let files = files();
    let manifest = manifest_for(&files);
    let bytes = encode(&manifest, &files).unwrap();

    let mut reader = ArtifactReader::new(&bytes[..], true).unwrap();
    assert_eq!(reader.manifest().checksum, manifest.checksum);

    let mut paths = Vec::new();
    let mut total = 0u64;
    loop {
        let mut sink = Vec::new();
        match reader.next_entry_into(&mut sink).unwrap() {
            Some(entry) => {
                assert_eq!(entry.size, sink.len() as u64);
                total += entry.size;
                paths.push(entry.path);
            }
            None => break,
        }
    }
    reader.finish().unwrap();

    assert_eq!(
        paths,
        vec!["schema/0001_init.sql", "schema/0002_more.sql", "seed/t.sql"]
    );
    assert_eq!(total, manifest.files.iter().map(|f| f.size).sum::<u64>());
}

#[test]
fn test_finish_before_reading_all_entries_fails() {
    let files = files();
    let manifest = manifest_for(&files);
    let bytes = encode(&manifest, &files).unwrap();

    let mut reader = ArtifactReader::new(&bytes[..], true).unwrap();
    reader.next_file().unwrap();
    assert!(reader.finish().is_err());
}
