// src/version.rs

//! Version comparison for installed system packages
//!
//! pkg-config reports versions such as `2.76.1`, `1.0~rc2` or
//! `3.13.1.with.ckbi.1.88`. These are compared segment by segment the way
//! rpmvercmp does it: the string is split into runs of digits and runs of
//! letters, numeric runs compare numerically, alphabetic runs compare
//! lexically, and a numeric run is newer than an alphabetic one.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Alpha(&'a str),
}

/// Split a version string into digit and letter runs, dropping separators
fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut result = Vec::new();
    let bytes = version.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        if bytes[i].is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            result.push(Segment::Number(&version[start..i]));
        } else if bytes[i].is_ascii_alphabetic() {
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            result.push(Segment::Alpha(&version[start..i]));
        } else {
            i += 1;
        }
    }
    result
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare two version strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let left = segments(a);
    let right = segments(b);

    for (x, y) in left.iter().zip(right.iter()) {
        let ord = match (x, y) {
            (Segment::Number(x), Segment::Number(y)) => compare_numbers(x, y),
            (Segment::Alpha(x), Segment::Alpha(y)) => x.cmp(y),
            (Segment::Number(_), Segment::Alpha(_)) => Ordering::Greater,
            (Segment::Alpha(_), Segment::Number(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

/// An owned version string ordered with [`compare_versions`]
#[derive(Debug, Clone)]
pub struct PkgVersion(String);

impl PkgVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this version is at least `required`
    pub fn satisfies(&self, required: &str) -> bool {
        compare_versions(&self.0, required) != Ordering::Less
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for PkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PkgVersion {}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.0, &other.0)
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_components() {
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
        assert_eq!(compare_versions("1.02", "1.2"), Ordering::Equal);
    }

    #[test]
    fn test_nss_style_version() {
        assert_eq!(
            compare_versions("3.13.1.with.ckbi.1.88", "3.14"),
            Ordering::Less
        );
        assert_eq!(
            compare_versions("3.14", "3.13.1.with.ckbi.1.88"),
            Ordering::Greater
        );
        assert_eq!(compare_versions("3.13.1.with.ckbi.1.88", "3.13"), Ordering::Greater);
    }

    #[test]
    fn test_alpha_segments() {
        assert_eq!(compare_versions("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(compare_versions("1.0.1", "1.0rc1"), Ordering::Greater);
    }

    #[test]
    fn test_satisfies() {
        assert!(PkgVersion::new("3.1").satisfies("3"));
        assert!(!PkgVersion::new("2").satisfies("3"));
        assert!(PkgVersion::new("2.76.1") > PkgVersion::new("2.8"));
    }
}
