//! Sender protocol: window tracker, congestion controller and RTT estimator
//! acting together for one outgoing stream.
//!
//! Owns the in-flight byte count and the retransmission timer. Everything is
//! driven by explicit `now` values, so the whole send side runs without a
//! socket in tests.

use std::time::{Duration, Instant};

use crate::config::TransportConfig;
use crate::congestion::CongestionController;
use crate::error::Result;
use crate::range::ByteRange;
use crate::rtt::RttEstimator;
use crate::timer::RetransmitTimer;
use crate::window::{AckOutcome, SendDecision, WindowTracker};

/// Next step for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmit {
    /// Every byte is acknowledged.
    Done,
    /// Nothing to send until an ack or timeout arrives.
    WouldBlock,
    /// Send `range` as packet `id`.
    Send { id: u64, range: ByteRange },
}

pub struct SenderProtocol {
    window: WindowTracker,
    congestion: Box<dyn CongestionController>,
    rtt: RttEstimator,
    timer: RetransmitTimer,
    receive_window: u64,
    chunk_size: u64,
    /// Payload bytes believed to be in flight. Zeroed on timeout.
    bytes_in_flight: u64,
    next_packet_id: u64,
    /// Set by `WouldBlock`, cleared by the next ack or timeout.
    waiting: bool,
    timeouts: u64,
}

impl SenderProtocol {
    pub fn new(stream_len: u64, config: &TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: WindowTracker::new(stream_len, config.chunk_size)?,
            congestion: config.congestion.build(config),
            rtt: RttEstimator::with_bounds(config.initial_rto, config.min_rto),
            timer: RetransmitTimer::new(),
            receive_window: config.receive_window,
            chunk_size: config.chunk_size as u64,
            bytes_in_flight: 0,
            next_packet_id: 0,
            waiting: false,
            timeouts: 0,
        })
    }

    /// Whether another full chunk fits in `min(receive_window, cwnd)`.
    pub fn can_send(&self) -> bool {
        !self.waiting
            && self.bytes_in_flight + self.chunk_size
                <= self.receive_window.min(self.congestion.window())
    }

    /// Ask for the next transmission at `now`.
    ///
    /// A `Send` is counted as in flight immediately, whether or not the
    /// datagram survives the network.
    pub fn poll_transmit(&mut self, now: Instant) -> Transmit {
        let id = self.next_packet_id;
        match self.window.next_to_send(id, now) {
            SendDecision::Done => Transmit::Done,
            SendDecision::WouldBlock => {
                self.waiting = true;
                Transmit::WouldBlock
            }
            SendDecision::Range(range) => {
                self.bytes_in_flight += range.len();
                self.next_packet_id += 1;
                Transmit::Send { id, range }
            }
        }
    }

    /// Apply an ack. A rejected ack changes nothing.
    pub fn on_ack(&mut self, sacks: &[ByteRange], id: u64, now: Instant) -> Result<AckOutcome> {
        let outcome = self.window.on_ack(sacks, id, now)?;
        if let Some(sample) = outcome.rtt_sample {
            self.rtt.update(sample);
        }
        self.congestion.on_ack(outcome.freed);
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(outcome.freed);
        self.waiting = false;
        Ok(outcome)
    }

    /// Arm the retransmission timer for a wait starting at `now`.
    pub fn arm_timer(&mut self, now: Instant) -> Instant {
        self.timer.arm(now, self.rtt.rto())
    }

    /// Fire the timeout if the armed deadline has passed. Returns whether it
    /// fired.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        if !self.timer.is_expired(now) {
            return false;
        }
        self.on_timeout();
        true
    }

    /// Retransmission timeout: rewind, back off, and forget what was in
    /// flight.
    pub fn on_timeout(&mut self) {
        self.timer.disarm();
        self.window.on_timeout();
        self.congestion.on_timeout();
        self.bytes_in_flight = 0;
        self.waiting = false;
        self.timeouts += 1;
        tracing::debug!(
            cwnd = self.congestion.window(),
            next = self.window.next_send(),
            "retransmission timeout"
        );
    }

    pub fn is_complete(&self) -> bool {
        self.window.is_complete()
    }

    pub fn rto(&self) -> Duration {
        self.rtt.rto()
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.rtt.srtt()
    }

    pub fn cwnd(&self) -> u64 {
        self.congestion.window()
    }

    pub fn ssthresh(&self) -> u64 {
        self.congestion.ssthresh()
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn packets_sent(&self) -> u64 {
        self.next_packet_id
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn acked_bytes(&self) -> u64 {
        self.window.acked_bytes()
    }

    pub fn controller_name(&self) -> &'static str {
        self.congestion.name()
    }
}
