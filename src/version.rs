//! Semantic version parsing, ordering, and path-segment escaping.
//!
//! Accepted grammar is `MAJOR.MINOR.PATCH[-TAG]` where the numeric parts are
//! decimal and `TAG` is a non-empty run of `[0-9A-Za-z.]`. A release sorts
//! above any pre-release with the same numeric triple; two tags compare
//! lexicographically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Literal accepted in place of a version to mean "no version chosen".
pub const UNSET: &str = "unset";

#[derive(Debug, Error, PartialEq)]
pub enum VersionError {
    #[error("Invalid version string '{0}' (expected MAJOR.MINOR.PATCH[-TAG])")]
    Invalid(String),
    #[error("Version '{0}' cannot be used as a directory name")]
    UnsafeSegment(String),
}

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre: Option<String>,
}

impl SemVer {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(s.to_string());

        let (numbers, pre) = match s.split_once('-') {
            Some((numbers, tag)) => {
                let valid_tag = !tag.is_empty()
                    && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
                if !valid_tag {
                    return Err(invalid());
                }
                (numbers, Some(tag.to_string()))
            }
            None => (s, None),
        };

        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut fields = [0u32; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            *field = part.parse().map_err(|_| invalid())?;
        }

        Ok(Self {
            major: fields[0],
            minor: fields[1],
            patch: fields[2],
            pre,
        })
    }

    /// Parse a version that may be left unset.
    ///
    /// Returns `Ok(None)` for the empty string or [`UNSET`], an error for any
    /// other string outside the grammar.
    pub fn parse_optional(s: &str) -> Result<Option<Self>, VersionError> {
        let s = s.trim();
        if s.is_empty() || s == UNSET {
            return Ok(None);
        }
        Self::parse(s).map(Some)
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compare two version strings.
///
/// Semantic versions use the [`SemVer`] order and always sort before opaque
/// tags (such as `git`), which compare as plain strings among themselves.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (SemVer::parse(a), SemVer::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Pick the greatest semantic version, skipping pre-releases unless asked.
pub fn latest<'a, I>(versions: I, include_pre: bool) -> Option<SemVer>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|v| SemVer::parse(v).ok())
        .filter(|v| include_pre || !v.is_prerelease())
        .max()
}

/// Reject versions that would not stay a single directory under a library.
///
/// Semantic versions and opaque tags such as `git` pass; separators, leading
/// dots and anything outside `[A-Za-z0-9_.+-]` do not.
pub fn validate_segment(s: &str) -> Result<(), VersionError> {
    let valid = !s.is_empty()
        && !s.starts_with('.')
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'));
    if !valid {
        return Err(VersionError::UnsafeSegment(s.to_string()));
    }
    Ok(())
}

/// Turn a version (or library name) into a directory name.
pub fn escape(s: &str) -> String {
    s.replace('.', ",")
}

/// Reverse [`escape`].
pub fn unescape(s: &str) -> String {
    s.replace(',', ".")
}
