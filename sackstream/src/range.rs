//! Half-open byte ranges addressing positions in the stream.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SackStreamError};

/// A contiguous run of stream bytes, `[start, end)`.
///
/// On the wire a range is a two-element array `[start, end]`. Decoding does
/// not check ordering; callers run [`ByteRange::validate`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Check the `start <= end` invariant.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(SackStreamError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether the two ranges share a byte or are directly adjacent.
    pub fn overlaps_or_touches(&self, other: &ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_range(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self { start, end }
    }
}

impl From<ByteRange> for (u64, u64) {
    fn from(range: ByteRange) -> Self {
        (range.start, range.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reversed_range() {
        assert!(ByteRange::new(10, 5).is_err());
        assert!(ByteRange::new(5, 5).unwrap().is_empty());
    }

    #[test]
    fn touching_counts_as_overlap() {
        let a = ByteRange::new(0, 10).unwrap();
        let b = ByteRange::new(10, 20).unwrap();
        let c = ByteRange::new(11, 20).unwrap();
        assert!(a.overlaps_or_touches(&b));
        assert!(b.overlaps_or_touches(&a));
        assert!(!a.overlaps_or_touches(&c));
    }

    #[test]
    fn serializes_as_pair() {
        let r = ByteRange::new(1200, 2400).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "[1200,2400]");
        let back: ByteRange = serde_json::from_str("[0,3000]").unwrap();
        assert_eq!(back, ByteRange { start: 0, end: 3000 });
    }
}
