//! Migration version identifiers
//!
//! Versions follow `MAJOR.MINOR.PATCH[-PRERELEASE]`. Build metadata (`+...`)
//! is rejected: artifacts are addressed by version alone, so two strings that
//! differ only in metadata would collide in the artifact store.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed, totally ordered migration version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<Prerelease>,
}

/// Dot-separated pre-release tag, kept verbatim for display and equality
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Prerelease {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Numeric(u64),
    Alpha(String),
}

/// Which component [`Version::next`] increments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Patch,
    Minor,
    Major,
}

impl Version {
    /// Build a release version (no pre-release tag)
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse a version string
    pub fn parse(input: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.contains('+') {
            return Err(invalid("build metadata ('+' suffix) is not supported"));
        }

        let (core, pre) = match input.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (input, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected MAJOR.MINOR.PATCH"));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("version components must be non-negative integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("version component out of range"))?;
        }

        let pre = match pre {
            Some(raw) => Some(Prerelease::parse(raw).ok_or_else(|| {
                invalid("pre-release must be dot-separated alphanumeric segments")
            })?),
            None => None,
        };

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    /// The pre-release tag, if any
    pub fn prerelease(&self) -> Option<&str> {
        self.pre.as_ref().map(|p| p.raw.as_str())
    }

    /// Whether this version carries a pre-release tag
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Compute the next version for a bump; the pre-release tag is always dropped
    pub fn next(&self, bump: BumpKind) -> CoreResult<Self> {
        let bumped = match bump {
            BumpKind::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch)),
            BumpKind::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0)),
            BumpKind::Major => self
                .major
                .checked_add(1)
                .map(|major| Self::new(major, 0, 0)),
        };
        bumped.ok_or_else(|| CoreError::InvalidVersion {
            input: self.to_string(),
            reason: "version component out of range".to_string(),
        })
    }
}

/// Compare two version strings, returning their ordering
pub fn compare(a: &str, b: &str) -> CoreResult<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Compute the next version string for a bump
pub fn next_version(version: &str, bump: BumpKind) -> CoreResult<Version> {
    Version::parse(version)?.next(bump)
}

impl Prerelease {
    fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty()
                || !part
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            {
                return None;
            }
            let segment = if part.bytes().all(|b| b.is_ascii_digit()) {
                Segment::Numeric(part.parse().ok()?)
            } else {
                Segment::Alpha(part.to_string())
            };
            segments.push(segment);
        }
        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
            (Segment::Alpha(a), Segment::Alpha(b)) => a.cmp(b),
            (Segment::Numeric(_), Segment::Alpha(_)) => Ordering::Less,
            (Segment::Alpha(_), Segment::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prerelease {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        // "01" and "1" are numerically equal; fall back to the raw text so the
        // order stays consistent with equality.
        self.segments
            .len()
            .cmp(&other.segments.len())
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Prerelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre.raw)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpKind::Patch => write!(f, "patch"),
            BumpKind::Minor => write!(f, "minor"),
            BumpKind::Major => write!(f, "major"),
        }
    }
}

impl FromStr for BumpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(BumpKind::Patch),
            "minor" => Ok(BumpKind::Minor),
            "major" => Ok(BumpKind::Major),
            other => Err(format!(
                "unknown bump kind '{}': expected patch, minor or major",
                other
            )),
        }
    }
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
