//! SHA-256 digests for migration files and manifests.

use sha2::{Digest, Sha256};
use std::io::{self, Write};

/// Identifier recorded in every manifest's `checksum_algorithm` field
pub const CHECKSUM_ALGORITHM: &str = "sha256";

/// Separator between `path:digest` entries when computing the aggregate
const AGGREGATE_SEPARATOR: &str = "\n";

/// Compute SHA256 checksum of a string
pub fn compute_checksum(s: &str) -> String {
    compute_file_digest(s.as_bytes())
}

/// Compute the SHA256 digest of a file's raw content
pub fn compute_file_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute the order-independent aggregate checksum over `(path, digest)` pairs
///
/// Entries are sorted by path (byte-wise) before hashing, so any permutation
/// of the same set yields the same checksum.
pub fn compute_aggregate_checksum<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut entries: Vec<(&str, &str)> = entries.into_iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    let joined = entries
        .iter()
        .map(|(path, digest)| format!("{}:{}", path, digest))
        .collect::<Vec<_>>()
        .join(AGGREGATE_SEPARATOR);

    compute_checksum(&joined)
}

/// A writer that hashes everything passing through it
///
/// Used by the artifact reader to digest file content while streaming it into
/// the caller's sink, so a file never has to be held twice.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Return the hex digest, byte count and the wrapped writer
    pub fn finish(self) -> (String, u64, W) {
        (format!("{:x}", self.hasher.finalize()), self.written, self.inner)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[path = "checksum_test.rs"]
mod tests;
