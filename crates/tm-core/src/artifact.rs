//! Artifact codec: one portable, compressed blob per migration version.
//!
//! Layout (inside a zstd stream):
//!
//! ```text
//! magic "TMKART01"
//! u32 manifest length | manifest JSON
//! u32 file count
//! repeated: u16 path length | path | u64 content length | content
//! ```
//!
//! All integers are big-endian. Decoding is incremental: [`ArtifactReader`]
//! holds at most one entry at a time and can stream an entry straight into a
//! caller-supplied writer while hashing it.

use crate::checksum::{compute_aggregate_checksum, DigestWriter};
use crate::error::{CoreError, CoreResult};
use crate::manifest::{FileCategory, Manifest, MigrationFile};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufReader, Read, Write};

const MAGIC: &[u8; 8] = b"TMKART01";
const COMPRESSION_LEVEL: i32 = 3;

/// Encode a manifest and its files into an artifact blob
///
/// Files are written in manifest order. Every manifest entry must have a
/// matching file and no extra files are accepted; digests are not checked
/// here, the decoder is the integrity boundary.
pub fn encode(manifest: &Manifest, files: &[MigrationFile]) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_to(manifest, files, &mut out)?;
    Ok(out)
}

/// Encode into an arbitrary writer
pub fn encode_to<W: Write>(
    manifest: &Manifest,
    files: &[MigrationFile],
    writer: W,
) -> CoreResult<()> {
    let by_path: HashMap<&str, &MigrationFile> =
        files.iter().map(|f| (f.path.as_str(), f)).collect();

    for file in files {
        if manifest.file(&file.path).is_none() {
            return Err(CoreError::UnexpectedArchiveEntry {
                path: file.path.clone(),
            });
        }
    }

    let mut encoder = zstd::stream::write::Encoder::new(writer, COMPRESSION_LEVEL)?;
    encoder.write_all(MAGIC)?;

    let manifest_json = serde_json::to_vec(manifest)?;
    let manifest_len = u32::try_from(manifest_json.len())
        .map_err(|_| CoreError::MalformedArchive("manifest too large".to_string()))?;
    encoder.write_all(&manifest_len.to_be_bytes())?;
    encoder.write_all(&manifest_json)?;

    let count = u32::try_from(manifest.files.len())
        .map_err(|_| CoreError::MalformedArchive("too many files".to_string()))?;
    encoder.write_all(&count.to_be_bytes())?;

    for entry in &manifest.files {
        let file = by_path
            .get(entry.path.as_str())
            .ok_or_else(|| CoreError::MissingArchiveEntry {
                path: entry.path.clone(),
            })?;
        let path_len = u16::try_from(file.path.len())
            .map_err(|_| CoreError::MalformedArchive(format!("path too long: {}", file.path)))?;
        encoder.write_all(&path_len.to_be_bytes())?;
        encoder.write_all(file.path.as_bytes())?;
        encoder.write_all(&(file.content.len() as u64).to_be_bytes())?;
        encoder.write_all(&file.content)?;
    }

    encoder.finish()?;
    Ok(())
}

/// Decode an artifact, verifying every file digest and the aggregate checksum
pub fn decode(bytes: &[u8]) -> CoreResult<(Manifest, Vec<MigrationFile>)> {
    decode_with(bytes, true)
}

/// Decode an artifact without any integrity checks
///
/// Only for operators who explicitly force past a failed verification.
pub fn decode_unverified(bytes: &[u8]) -> CoreResult<(Manifest, Vec<MigrationFile>)> {
    decode_with(bytes, false)
}

fn decode_with(bytes: &[u8], verify: bool) -> CoreResult<(Manifest, Vec<MigrationFile>)> {
    let mut reader = ArtifactReader::new(bytes, verify)?;
    let mut files = Vec::with_capacity(reader.manifest().files.len());
    while let Some(file) = reader.next_file()? {
        files.push(file);
    }
    let manifest = reader.finish()?;
    Ok((manifest, files))
}

/// Metadata about one entry extracted by [`ArtifactReader::next_entry_into`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub path: String,
    pub category: FileCategory,
    pub size: u64,
    pub checksum: String,
}

/// Incremental artifact decoder
pub struct ArtifactReader<R: Read> {
    inner: zstd::stream::read::Decoder<'static, BufReader<R>>,
    manifest: Manifest,
    remaining: u32,
    verify: bool,
    seen: HashSet<String>,
    digests: Vec<(String, String)>,
}

impl<R: Read> ArtifactReader<R> {
    /// Open an artifact stream and read its manifest
    pub fn new(reader: R, verify: bool) -> CoreResult<Self> {
        let mut inner = zstd::stream::read::Decoder::new(reader).map_err(malformed)?;

        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic).map_err(malformed)?;
        if &magic != MAGIC {
            return Err(CoreError::MalformedArchive(
                "not a tidemark artifact (bad magic)".to_string(),
            ));
        }

        // The length prefix is untrusted; buffer only what the stream holds
        let manifest_len = read_u32(&mut inner)?;
        let mut manifest_json = Vec::new();
        (&mut inner)
            .take(u64::from(manifest_len))
            .read_to_end(&mut manifest_json)
            .map_err(malformed)?;
        if manifest_json.len() as u64 != u64::from(manifest_len) {
            return Err(CoreError::MalformedArchive(format!(
                "manifest truncated: expected {} bytes, got {}",
                manifest_len,
                manifest_json.len()
            )));
        }
        let manifest: Manifest = serde_json::from_slice(&manifest_json)?;

        let remaining = read_u32(&mut inner)?;
        if verify && remaining as usize != manifest.files.len() {
            return Err(CoreError::MalformedArchive(format!(
                "archive holds {} files but manifest lists {}",
                remaining,
                manifest.files.len()
            )));
        }

        Ok(Self {
            inner,
            manifest,
            remaining,
            verify,
            seen: HashSet::new(),
            digests: Vec::new(),
        })
    }

    /// The manifest embedded in the artifact
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Stream the next entry's content into `sink`
    ///
    /// Returns `None` once every entry has been read. When verifying, the
    /// entry's digest and size are checked against the manifest before
    /// returning; the sink may already hold the rejected bytes.
    pub fn next_entry_into<W: Write>(&mut self, sink: W) -> CoreResult<Option<ExtractedEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let path_len = read_u16(&mut self.inner)? as usize;
        let mut path_bytes = vec![0u8; path_len];
        self.inner.read_exact(&mut path_bytes).map_err(malformed)?;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| CoreError::MalformedArchive("entry path is not UTF-8".to_string()))?;
        validate_entry_path(&path)?;

        if !self.seen.insert(path.clone()) {
            return Err(CoreError::DuplicatePath { path });
        }

        let size = read_u64(&mut self.inner)?;
        let mut writer = DigestWriter::new(sink);
        let copied = io::copy(&mut (&mut self.inner).take(size), &mut writer).map_err(malformed)?;
        if copied != size {
            return Err(CoreError::MalformedArchive(format!(
                "entry '{}' truncated: expected {} bytes, got {}",
                path, size, copied
            )));
        }
        let (checksum, _, _) = writer.finish();

        let recorded = self.manifest.file(&path);
        if self.verify {
            let recorded = recorded.ok_or_else(|| CoreError::UnexpectedArchiveEntry {
                path: path.clone(),
            })?;
            if recorded.checksum != checksum {
                return Err(CoreError::FileChecksumMismatch {
                    path,
                    expected: recorded.checksum.clone(),
                    actual: checksum,
                });
            }
            if recorded.size != size {
                return Err(CoreError::SizeMismatch {
                    path,
                    expected: recorded.size,
                    actual: size,
                });
            }
        }

        let category = recorded
            .map(|f| f.category)
            .unwrap_or_else(|| FileCategory::from_path(&path));
        self.digests.push((path.clone(), checksum.clone()));

        Ok(Some(ExtractedEntry {
            path,
            category,
            size,
            checksum,
        }))
    }

    /// Read the next entry fully into memory
    pub fn next_file(&mut self) -> CoreResult<Option<MigrationFile>> {
        let mut content = Vec::new();
        let entry = self.next_entry_into(&mut content)?;
        Ok(entry.map(|entry| MigrationFile::new(entry.path, content, entry.category)))
    }

    /// Finish decoding, running the manifest-level checks
    ///
    /// When verifying: every manifest file must have been read, and the
    /// aggregate checksum recomputed from the extracted content must match
    /// the manifest's recorded checksum.
    pub fn finish(self) -> CoreResult<Manifest> {
        if self.remaining != 0 {
            return Err(CoreError::MalformedArchive(format!(
                "{} entries were not read",
                self.remaining
            )));
        }

        if self.verify {
            if let Some(missing) = self
                .manifest
                .files
                .iter()
                .find(|f| !self.seen.contains(&f.path))
            {
                return Err(CoreError::MissingArchiveEntry {
                    path: missing.path.clone(),
                });
            }

            let actual = compute_aggregate_checksum(
                self.digests.iter().map(|(p, d)| (p.as_str(), d.as_str())),
            );
            if actual != self.manifest.checksum {
                return Err(CoreError::AggregateChecksumMismatch {
                    expected: self.manifest.checksum.clone(),
                    actual,
                });
            }
        }

        Ok(self.manifest)
    }
}

fn validate_entry_path(path: &str) -> CoreResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|part| part == ".." || part.is_empty())
    {
        return Err(CoreError::MalformedArchive(format!(
            "unsafe entry path '{}'",
            path
        )));
    }
    Ok(())
}

fn malformed(err: io::Error) -> CoreError {
    CoreError::MalformedArchive(err.to_string())
}

fn read_u16<R: Read>(reader: &mut R) -> CoreResult<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).map_err(malformed)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> CoreResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(malformed)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> CoreResult<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(malformed)?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
#[path = "artifact_test.rs"]
mod tests;
