//! AIMD congestion control with slow start.
//!
//! Slow start (cwnd < ssthresh): cwnd += freed
//! Congestion avoidance:          cwnd += freed * chunk / cwnd
//!   (about one chunk per round trip)
//! On timeout: cwnd = max(cwnd / 2, chunk), ssthresh = max(cwnd, chunk).

use crate::congestion::CongestionController;

/// Default initial slow-start threshold: 64 KiB.
pub const DEFAULT_SSTHRESH: u64 = 64 * 1024;

/// AIMD congestion controller.
#[derive(Debug, Clone)]
pub struct Aimd {
    /// Window in bytes. Fractional growth accumulates here and is floored
    /// only when read.
    cwnd: f64,
    ssthresh: f64,
    chunk: f64,
}

impl Aimd {
    /// Start with a one-chunk window and the given threshold.
    pub fn new(chunk_size: usize, initial_ssthresh: u64) -> Self {
        let chunk = chunk_size.max(1) as f64;
        Self {
            cwnd: chunk,
            ssthresh: initial_ssthresh as f64,
            chunk,
        }
    }

    /// Unfloored window, for diagnostics.
    pub fn cwnd_exact(&self) -> f64 {
        self.cwnd
    }
}

impl CongestionController for Aimd {
    fn on_ack(&mut self, freed: u64) {
        if freed == 0 {
            return;
        }
        let freed = freed as f64;
        if self.cwnd < self.ssthresh {
            self.cwnd += freed;
        } else {
            self.cwnd += freed * self.chunk / self.cwnd.max(1.0);
        }
    }

    fn on_timeout(&mut self) {
        self.cwnd = (self.cwnd / 2.0).max(self.chunk);
        self.ssthresh = self.cwnd.max(self.chunk);
        tracing::debug!(cwnd = self.cwnd, ssthresh = self.ssthresh, "aimd backoff");
    }

    fn window(&self) -> u64 {
        self.cwnd as u64
    }

    fn ssthresh(&self) -> u64 {
        self.ssthresh as u64
    }

    fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    fn name(&self) -> &'static str {
        "aimd"
    }
}
