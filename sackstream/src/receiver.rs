//! Receiver adapter: one per peer.
//!
//! Wraps a [`SegmentStore`] and turns each incoming data range into the
//! acknowledgment to send back plus whatever bytes became deliverable.

use bytes::Bytes;

use crate::error::{Result, SackStreamError};
use crate::range::ByteRange;
use crate::reassembly::SegmentStore;

/// What the application sees after one data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The delivery cursor did not move.
    NoChange,
    /// These bytes follow the previous delivery directly.
    Delivered(Bytes),
}

/// Result of absorbing one data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOutcome {
    /// `[0, cursor)` followed by every pending stored range.
    pub acks: Vec<ByteRange>,
    pub delivery: Delivery,
}

/// State of the stream when the peer signals it is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    /// Total bytes handed to the application.
    pub delivered: u64,
    /// Earliest hole still blocking delivery, if the stream is incomplete.
    pub first_gap: Option<ByteRange>,
    /// Bytes received but never delivered.
    pub stranded_bytes: u64,
}

impl FinishReport {
    pub fn is_complete(&self) -> bool {
        self.stranded_bytes == 0
    }
}

/// Per-peer receive state.
#[derive(Debug)]
pub struct ReceiverAdapter {
    store: SegmentStore,
    max_payload: usize,
}

impl ReceiverAdapter {
    /// `max_payload` is the largest payload accepted in one message (one
    /// chunk).
    pub fn new(max_payload: usize) -> Self {
        Self {
            store: SegmentStore::new(),
            max_payload,
        }
    }

    /// Absorb one data message.
    ///
    /// Structurally invalid input is rejected before the store is touched.
    pub fn on_data(&mut self, seq: ByteRange, payload: Bytes) -> Result<ReceiveOutcome> {
        seq.validate()?;
        if payload.len() > self.max_payload {
            return Err(SackStreamError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        self.store.insert(seq, payload)?;
        let (cursor, ready) = self.store.deliverable_prefix();

        let mut acks = Vec::with_capacity(1 + self.store.segment_count());
        acks.push(ByteRange { start: 0, end: cursor });
        acks.extend(self.store.pending_ranges());

        let delivery = if ready.is_empty() {
            Delivery::NoChange
        } else {
            Delivery::Delivered(ready)
        };
        Ok(ReceiveOutcome { acks, delivery })
    }

    /// Summarize the stream once the peer sends `fin`.
    pub fn on_finish(&self) -> FinishReport {
        FinishReport {
            delivered: self.store.cursor(),
            first_gap: self.store.first_gap(),
            stranded_bytes: self.store.buffered_bytes(),
        }
    }

    /// Bytes delivered so far.
    pub fn delivered(&self) -> u64 {
        self.store.cursor()
    }
}
