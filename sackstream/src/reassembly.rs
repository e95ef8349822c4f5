//! Receiver-side segment reassembly.
//!
//! Incoming byte ranges may arrive in any order, overlap each other, or be
//! duplicated outright. The [`SegmentStore`] keeps every received but not yet
//! delivered range in a `BTreeMap` keyed by start offset and maintains one
//! invariant after every insertion: no two stored segments overlap or touch.
//! Only the gapless prefix starting at the delivery cursor is ever handed to
//! the application.
//!
//! Where a new range overlaps bytes that are already stored, the stored bytes
//! win and only the extension contributed by the newcomer is spliced in.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Result, SackStreamError};
use crate::range::ByteRange;

/// A stored run of contiguous bytes. The start offset is the map key.
#[derive(Debug, Clone)]
struct Segment {
    end: u64,
    data: Bytes,
}

/// Ordered, always-coalesced set of received segments plus the delivery
/// cursor (`app_sent_index`).
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: BTreeMap<u64, Segment>,
    /// Next stream offset the application expects. Never decreases.
    cursor: u64,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a received range and its payload.
    ///
    /// Zero-length ranges and ranges already fully covered (stored or
    /// delivered) leave the store untouched. Bytes below the cursor were
    /// delivered earlier and are trimmed off so nothing is emitted twice.
    pub fn insert(&mut self, range: ByteRange, data: Bytes) -> Result<()> {
        range.validate()?;
        if data.len() as u64 != range.len() {
            return Err(SackStreamError::PayloadLengthMismatch {
                expected: range.len(),
                actual: data.len(),
            });
        }
        if range.is_empty() || range.end <= self.cursor {
            return Ok(());
        }

        let (start, data) = if range.start < self.cursor {
            let skip = (self.cursor - range.start) as usize;
            (self.cursor, data.slice(skip..))
        } else {
            (range.start, data)
        };
        let incoming = ByteRange {
            start,
            end: range.end,
        };

        // Every stored segment touching `incoming`. Segments are disjoint, so
        // walking backwards from the last start <= incoming.end, ends only
        // decrease and the scan can stop at the first one that falls short.
        let touching: Vec<u64> = self
            .segments
            .range(..=incoming.end)
            .rev()
            .take_while(|&(&seg_start, seg)| {
                ByteRange {
                    start: seg_start,
                    end: seg.end,
                }
                .overlaps_or_touches(&incoming)
            })
            .map(|(&seg_start, _)| seg_start)
            .collect();

        if touching.is_empty() {
            self.segments.insert(
                incoming.start,
                Segment {
                    end: incoming.end,
                    data,
                },
            );
            return Ok(());
        }

        if let [only] = touching.as_slice() {
            let seg = &self.segments[only];
            let stored = ByteRange {
                start: *only,
                end: seg.end,
            };
            if stored.contains_range(&incoming) {
                return Ok(());
            }
        }

        // `touching` is in descending start order.
        let lowest = touching[touching.len() - 1];
        let highest_end = self.segments[&touching[0]].end;
        let merged_start = lowest.min(incoming.start);
        let merged_end = highest_end.max(incoming.end);

        let mut buf = vec![0u8; (merged_end - merged_start) as usize];
        let offset = (incoming.start - merged_start) as usize;
        buf[offset..offset + data.len()].copy_from_slice(&data);

        for seg_start in &touching {
            if let Some(seg) = self.segments.remove(seg_start) {
                let offset = (seg_start - merged_start) as usize;
                buf[offset..offset + seg.data.len()].copy_from_slice(&seg.data);
            }
        }

        tracing::trace!(
            merged = touching.len(),
            start = merged_start,
            end = merged_end,
            "coalesced segments"
        );

        self.segments.insert(
            merged_start,
            Segment {
                end: merged_end,
                data: Bytes::from(buf),
            },
        );
        Ok(())
    }

    /// Pop the segment sitting exactly at the cursor, if any.
    ///
    /// Returns the (possibly advanced) cursor and the bytes that became
    /// deliverable, which are empty when nothing moved. Stored segments never
    /// touch, so one pop is always the whole deliverable prefix.
    pub fn deliverable_prefix(&mut self) -> (u64, Bytes) {
        match self.segments.first_key_value() {
            Some((&start, _)) if start == self.cursor => {
                if let Some(seg) = self.segments.remove(&start) {
                    self.cursor = seg.end;
                    return (self.cursor, seg.data);
                }
                (self.cursor, Bytes::new())
            }
            _ => (self.cursor, Bytes::new()),
        }
    }

    /// Stored ranges in increasing offset order (the SACK blocks).
    pub fn pending_ranges(&self) -> Vec<ByteRange> {
        self.segments
            .iter()
            .map(|(&start, seg)| ByteRange {
                start,
                end: seg.end,
            })
            .collect()
    }

    /// The earliest hole between the cursor and the first stored segment.
    pub fn first_gap(&self) -> Option<ByteRange> {
        self.segments
            .first_key_value()
            .filter(|&(&start, _)| start > self.cursor)
            .map(|(&start, _)| ByteRange {
                start: self.cursor,
                end: start,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Current delivery cursor.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of bytes held while waiting for earlier gaps to fill.
    pub fn buffered_bytes(&self) -> u64 {
        self.segments
            .iter()
            .map(|(&start, seg)| seg.end - start)
            .sum()
    }

    /// Number of disjoint stored segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    fn insert(store: &mut SegmentStore, start: u64, data: &'static [u8]) {
        store
            .insert(range(start, start + data.len() as u64), Bytes::from_static(data))
            .unwrap();
    }

    #[test]
    fn in_order_segment_is_deliverable() {
        let mut store = SegmentStore::new();
        insert(&mut store, 0, b"hello");
        let (cursor, data) = store.deliverable_prefix();
        assert_eq!(cursor, 5);
        assert_eq!(&data[..], b"hello");
        assert!(store.is_empty());
    }

    #[test]
    fn gap_holds_back_delivery() {
        let mut store = SegmentStore::new();
        insert(&mut store, 5, b"world");
        let (cursor, data) = store.deliverable_prefix();
        assert_eq!(cursor, 0);
        assert!(data.is_empty());
        assert_eq!(store.first_gap(), Some(range(0, 5)));
    }

    #[test]
    fn bridging_insert_coalesces_both_neighbours() {
        let mut store = SegmentStore::new();
        insert(&mut store, 10, b"aaaaaaaaaa");
        insert(&mut store, 30, b"cccccccccc");
        insert(&mut store, 20, b"bbbbbbbbbb");
        assert_eq!(store.pending_ranges(), vec![range(10, 40)]);
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn adjacent_segments_merge_but_separated_ones_do_not() {
        let mut store = SegmentStore::new();
        insert(&mut store, 10, b"aaaaa");
        insert(&mut store, 21, b"cccc");
        insert(&mut store, 15, b"bbbbb");
        assert_eq!(store.pending_ranges(), vec![range(10, 20), range(21, 25)]);
    }

    #[test]
    fn overlap_keeps_stored_bytes() {
        let mut store = SegmentStore::new();
        insert(&mut store, 2, b"XXXX");
        insert(&mut store, 0, b"abcdefgh");
        let (_, data) = store.deliverable_prefix();
        assert_eq!(&data[..], b"abXXXXgh");
    }

    #[test]
    fn zero_length_is_noop() {
        let mut store = SegmentStore::new();
        store.insert(range(7, 7), Bytes::new()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut store = SegmentStore::new();
        let err = store
            .insert(range(0, 4), Bytes::from_static(b"abc"))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
    }

    #[test]
    fn delivered_bytes_are_trimmed() {
        let mut store = SegmentStore::new();
        insert(&mut store, 0, b"abcd");
        store.deliverable_prefix();

        // Entirely old: ignored.
        insert(&mut store, 0, b"abcd");
        assert!(store.is_empty());

        // Straddles the cursor: only the new tail is kept.
        insert(&mut store, 2, b"cdef");
        let (cursor, data) = store.deliverable_prefix();
        assert_eq!(cursor, 6);
        assert_eq!(&data[..], b"ef");
    }

    #[test]
    fn buffered_bytes_counts_stored_segments() {
        let mut store = SegmentStore::new();
        insert(&mut store, 4, b"xx");
        insert(&mut store, 10, b"yyy");
        assert_eq!(store.buffered_bytes(), 5);
    }
}
