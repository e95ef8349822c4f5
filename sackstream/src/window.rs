//! Sender window tracker.
//!
//! The stream is cut into fixed-size chunks. A bitmap records which chunks
//! the receiver has acknowledged; two cursors walk it:
//!
//! - `min_unacked`: lowest chunk not yet acknowledged. Only moves forward.
//! - `next_send`: next chunk to (re)transmit. Moves forward as chunks are
//!   handed out and jumps back to `min_unacked` on timeout.
//!
//! The bitmap has `len / chunk + 1` slots. When the stream length is an exact
//! multiple of the chunk size (including an empty stream) the last slot covers
//! no bytes; it starts out acknowledged so completion is reachable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Result, SackStreamError};
use crate::range::ByteRange;

/// What the sender should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    /// Every chunk is acknowledged; send `fin`.
    Done,
    /// Everything past `next_send` is acknowledged or already out. Wait for
    /// an ack or a timeout.
    WouldBlock,
    /// Transmit this range.
    Range(ByteRange),
}

/// Effect of one acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckOutcome {
    /// Payload bytes newly acknowledged by this ack alone.
    pub freed: u64,
    /// Round trip of the packet this ack answers, if it was still tracked.
    pub rtt_sample: Option<Duration>,
}

/// Chunk bitmap plus in-flight registry for one outgoing stream.
#[derive(Debug)]
pub struct WindowTracker {
    stream_len: u64,
    chunk_size: u64,
    acked: Vec<bool>,
    min_unacked: usize,
    next_send: usize,
    acked_bytes: u64,
    /// packet id -> time it went out.
    in_flight: HashMap<u64, Instant>,
}

impl WindowTracker {
    /// Create a tracker for a stream of `stream_len` bytes.
    ///
    /// `chunk_size` must be non-zero; configuration validation enforces this.
    pub fn new(stream_len: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SackStreamError::InvalidConfig(
                "chunk size must be non-zero".into(),
            ));
        }
        let chunk_size = chunk_size as u64;
        let slots = (stream_len / chunk_size + 1) as usize;
        let mut acked = vec![false; slots];
        if stream_len % chunk_size == 0 {
            acked[slots - 1] = true;
        }
        let mut tracker = Self {
            stream_len,
            chunk_size,
            acked,
            min_unacked: 0,
            next_send: 0,
            acked_bytes: 0,
            in_flight: HashMap::new(),
        };
        tracker.advance_min_unacked();
        Ok(tracker)
    }

    /// Byte range covered by chunk `index`, clipped to the stream length.
    fn chunk_range(&self, index: usize) -> ByteRange {
        let start = (index as u64 * self.chunk_size).min(self.stream_len);
        let end = (start + self.chunk_size).min(self.stream_len);
        ByteRange { start, end }
    }

    fn advance_min_unacked(&mut self) {
        while self.min_unacked < self.acked.len() && self.acked[self.min_unacked] {
            self.min_unacked += 1;
        }
    }

    /// Pick the next range to transmit as packet `packet_id`.
    pub fn next_to_send(&mut self, packet_id: u64, now: Instant) -> SendDecision {
        if self.min_unacked >= self.acked.len() {
            return SendDecision::Done;
        }

        while self.next_send < self.acked.len() && self.acked[self.next_send] {
            self.next_send += 1;
        }
        if self.next_send >= self.acked.len() {
            return SendDecision::WouldBlock;
        }

        let range = self.chunk_range(self.next_send);
        self.next_send += 1;
        self.in_flight.insert(packet_id, now);
        SendDecision::Range(range)
    }

    /// Apply an acknowledgment carrying `sacks` for packet `packet_id`.
    ///
    /// Every chunk overlapping a sack range is marked acknowledged. The whole
    /// ack is validated first; a rejected ack leaves the tracker unchanged.
    pub fn on_ack(&mut self, sacks: &[ByteRange], packet_id: u64, now: Instant) -> Result<AckOutcome> {
        for sack in sacks {
            sack.validate()?;
            if sack.end > self.stream_len {
                return Err(SackStreamError::SackOutOfRange {
                    start: sack.start,
                    end: sack.end,
                    stream_len: self.stream_len,
                });
            }
        }

        let mut freed = 0;
        for sack in sacks.iter().filter(|s| !s.is_empty()) {
            let first = (sack.start / self.chunk_size) as usize;
            let last = ((sack.end - 1) / self.chunk_size) as usize;
            for index in first..=last {
                if !self.acked[index] {
                    self.acked[index] = true;
                    freed += self.chunk_range(index).len();
                }
            }
        }
        self.acked_bytes += freed;
        self.advance_min_unacked();

        let rtt_sample = self
            .in_flight
            .remove(&packet_id)
            .map(|sent| now.saturating_duration_since(sent));

        Ok(AckOutcome { freed, rtt_sample })
    }

    /// Retransmission timer fired: rewind to the oldest unacknowledged chunk
    /// and forget every outstanding send time.
    pub fn on_timeout(&mut self) {
        self.next_send = self.min_unacked;
        self.in_flight.clear();
    }

    pub fn is_complete(&self) -> bool {
        self.min_unacked >= self.acked.len()
    }

    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn min_unacked(&self) -> usize {
        self.min_unacked
    }

    pub fn next_send(&self) -> usize {
        self.next_send
    }

    /// Unique payload bytes acknowledged so far.
    pub fn acked_bytes(&self) -> u64 {
        self.acked_bytes
    }

    /// Packets sent whose ack has not yet arrived.
    pub fn in_flight_packets(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    #[test]
    fn chunks_clip_final_range() {
        let now = Instant::now();
        let mut w = WindowTracker::new(3000, 1200).unwrap();
        assert_eq!(w.next_to_send(0, now), SendDecision::Range(r(0, 1200)));
        assert_eq!(w.next_to_send(1, now), SendDecision::Range(r(1200, 2400)));
        assert_eq!(w.next_to_send(2, now), SendDecision::Range(r(2400, 3000)));
        assert_eq!(w.next_to_send(3, now), SendDecision::WouldBlock);
        assert_eq!(w.in_flight_packets(), 3);
    }

    #[test]
    fn exact_multiple_completes() {
        let now = Instant::now();
        let mut w = WindowTracker::new(2400, 1200).unwrap();
        w.next_to_send(0, now);
        w.next_to_send(1, now);
        assert_eq!(w.next_to_send(2, now), SendDecision::WouldBlock);
        let out = w.on_ack(&[r(0, 2400)], 1, now).unwrap();
        assert_eq!(out.freed, 2400);
        assert_eq!(w.next_to_send(3, now), SendDecision::Done);
    }

    #[test]
    fn empty_stream_is_done_immediately() {
        let mut w = WindowTracker::new(0, 1200).unwrap();
        assert!(w.is_complete());
        assert_eq!(w.next_to_send(0, Instant::now()), SendDecision::Done);
    }

    #[test]
    fn duplicate_ack_frees_nothing() {
        let now = Instant::now();
        let mut w = WindowTracker::new(3000, 1200).unwrap();
        w.next_to_send(0, now);
        assert_eq!(w.on_ack(&[r(0, 1200)], 0, now).unwrap().freed, 1200);
        assert_eq!(w.on_ack(&[r(0, 1200)], 0, now).unwrap().freed, 0);
        assert_eq!(w.acked_bytes(), 1200);
    }

    #[test]
    fn rtt_sample_for_tracked_packet() {
        let sent = Instant::now();
        let mut w = WindowTracker::new(1200, 1200).unwrap();
        w.next_to_send(7, sent);
        let later = sent + Duration::from_millis(30);
        let out = w.on_ack(&[r(0, 1200)], 7, later).unwrap();
        assert_eq!(out.rtt_sample, Some(Duration::from_millis(30)));
        let again = w.on_ack(&[r(0, 1200)], 7, later).unwrap();
        assert_eq!(again.rtt_sample, None);
    }

    #[test]
    fn sack_past_stream_end_rejected_atomically() {
        let now = Instant::now();
        let mut w = WindowTracker::new(3000, 1200).unwrap();
        let err = w.on_ack(&[r(0, 1200), r(2400, 3600)], 0, now).unwrap_err();
        assert!(matches!(err, SackStreamError::SackOutOfRange { .. }));
        assert_eq!(w.acked_bytes(), 0);
        assert_eq!(w.min_unacked(), 0);
    }

    #[test]
    fn timeout_rewinds_to_min_unacked() {
        let now = Instant::now();
        let mut w = WindowTracker::new(6000, 1200).unwrap();
        for id in 0..5 {
            w.next_to_send(id, now);
        }
        w.on_ack(&[r(0, 1200), r(2400, 3600)], 0, now).unwrap();
        w.on_timeout();
        assert_eq!(w.in_flight_packets(), 0);
        assert_eq!(w.next_to_send(9, now), SendDecision::Range(r(1200, 2400)));
        // Chunk 2 is acked and skipped.
        assert_eq!(w.next_to_send(10, now), SendDecision::Range(r(3600, 4800)));
    }

    #[test]
    fn zero_chunk_rejected() {
        assert!(WindowTracker::new(10, 0).is_err());
    }
}
