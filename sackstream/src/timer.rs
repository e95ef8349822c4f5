//! Retransmission deadline.
//!
//! The core never sleeps or reads the clock. It arms a deadline from an
//! explicit `now` and the current RTO, and the driver waits until that
//! instant. Expiry is checked against a caller-supplied `now` too.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct RetransmitTimer {
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer and return its deadline.
    pub fn arm(&mut self, now: Instant, rto: Duration) -> Instant {
        let deadline = now + rto;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the armed deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}
