//! Document version gate.
//!
//! The root `version` attribute is a comma list of ranges: `3` (exactly 3),
//! `3+` (3 or later), `2-4` (inclusive span). The document is accepted when
//! any range contains the supported version.

use regex::Regex;

use crate::error::SpecError;

/// The document version this build understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// A single parsed version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionRange {
    Exact(u32),
    AtLeast(u32),
    Span(u32, u32),
}

impl VersionRange {
    fn contains(&self, version: u32) -> bool {
        match *self {
            VersionRange::Exact(v) => version == v,
            VersionRange::AtLeast(v) => version >= v,
            VersionRange::Span(lo, hi) => (lo..=hi).contains(&version),
        }
    }
}

fn parse_ranges(spec: &str) -> Result<Vec<VersionRange>, SpecError> {
    let re = Regex::new(r"^(?:(\d+)\+|(\d+)-(\d+)|(\d+))$").unwrap();
    let mut ranges = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        let caps = re
            .captures(part)
            .ok_or_else(|| SpecError::InvalidVersionRange {
                range: part.to_string(),
                message: "expected N, N+ or N1-N2".to_string(),
            })?;
        let num = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>().unwrap());
        if let Some(v) = num(1) {
            ranges.push(VersionRange::AtLeast(v));
        } else if let (Some(lo), Some(hi)) = (num(2), num(3)) {
            if lo > hi {
                return Err(SpecError::InvalidVersionRange {
                    range: part.to_string(),
                    message: "lower bound exceeds upper bound".to_string(),
                });
            }
            ranges.push(VersionRange::Span(lo, hi));
        } else if let Some(v) = num(4) {
            ranges.push(VersionRange::Exact(v));
        }
    }
    if ranges.is_empty() {
        return Err(SpecError::InvalidVersionRange {
            range: spec.to_string(),
            message: "empty version specification".to_string(),
        });
    }
    Ok(ranges)
}

/// Check a document version specification against the supported version.
pub fn check_version(spec: &str) -> Result<(), SpecError> {
    let ranges = parse_ranges(spec)?;
    if ranges.iter().any(|r| r.contains(SUPPORTED_VERSION)) {
        Ok(())
    } else {
        Err(SpecError::VersionMismatch {
            version: spec.to_string(),
            supported: SUPPORTED_VERSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_plus_and_span() {
        assert!(check_version("1").is_ok());
        assert!(check_version("0+").is_ok());
        assert!(check_version("0-3").is_ok());
        assert!(check_version("7,1").is_ok());
    }

    #[test]
    fn rejects_mismatch_and_garbage() {
        assert!(matches!(
            check_version("2"),
            Err(SpecError::VersionMismatch { .. })
        ));
        assert!(matches!(
            check_version("2+"),
            Err(SpecError::VersionMismatch { .. })
        ));
        assert!(matches!(
            check_version("abc"),
            Err(SpecError::InvalidVersionRange { .. })
        ));
        assert!(matches!(
            check_version("4-2"),
            Err(SpecError::InvalidVersionRange { .. })
        ));
    }
}
