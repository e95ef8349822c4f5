//! Constant congestion window.
//!
//! Holds the window at `packets * chunk` regardless of acks or timeouts.
//! Used to measure goodput as a function of window size.

use crate::congestion::CongestionController;

#[derive(Debug, Clone)]
pub struct FixedWindow {
    window: u64,
}

impl FixedWindow {
    pub fn new(packets: u64, chunk_size: usize) -> Self {
        Self {
            window: packets.saturating_mul(chunk_size as u64),
        }
    }
}

impl CongestionController for FixedWindow {
    fn on_ack(&mut self, _freed: u64) {}

    fn on_timeout(&mut self) {}

    fn window(&self) -> u64 {
        self.window
    }

    fn ssthresh(&self) -> u64 {
        self.window
    }

    fn in_slow_start(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
