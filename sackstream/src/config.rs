//! Transport configuration.

use std::time::Duration;

use crate::congestion::aimd::{Aimd, DEFAULT_SSTHRESH};
use crate::congestion::fixed::FixedWindow;
use crate::congestion::CongestionController;
use crate::error::{Result, SackStreamError};
use crate::rtt::{DEFAULT_INITIAL_RTO, DEFAULT_MIN_RTO};

/// Largest payload carried by one data message.
pub const DEFAULT_CHUNK_SIZE: usize = 1200;
/// Largest encoded datagram for text payloads.
pub const DEFAULT_MAX_DATAGRAM: usize = 1500;
/// Receiver-advertised window assumed by the sender.
pub const DEFAULT_RECEIVE_WINDOW: u64 = 15_000_000;

/// Which congestion controller the sender runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CongestionMode {
    /// Slow start plus additive increase / multiplicative decrease.
    #[default]
    Aimd,
    /// Constant window of `packets` chunks.
    Fixed { packets: u64 },
}

impl CongestionMode {
    pub fn build(&self, config: &TransportConfig) -> Box<dyn CongestionController> {
        match *self {
            CongestionMode::Aimd => Box::new(Aimd::new(config.chunk_size, config.initial_ssthresh)),
            CongestionMode::Fixed { packets } => {
                Box::new(FixedWindow::new(packets, config.chunk_size))
            }
        }
    }
}

/// Configuration shared by both ends of a transfer.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Payload bytes per data message.
    pub chunk_size: usize,
    /// Upper bound on an encoded datagram for text payloads.
    pub max_datagram: usize,
    /// Receive window assumed by the sender, in bytes.
    pub receive_window: u64,
    /// Probability of dropping an outgoing data message or incoming ack.
    pub loss_probability: f64,
    pub congestion: CongestionMode,
    pub initial_ssthresh: u64,
    pub initial_rto: Duration,
    pub min_rto: Duration,
    /// How many times `fin` is sent once the stream is acknowledged.
    pub fin_repeats: u32,
    /// Seed for the loss simulator. `None` draws from the OS.
    pub loss_seed: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_datagram: DEFAULT_MAX_DATAGRAM,
            receive_window: DEFAULT_RECEIVE_WINDOW,
            loss_probability: 0.0,
            congestion: CongestionMode::Aimd,
            initial_ssthresh: DEFAULT_SSTHRESH,
            initial_rto: DEFAULT_INITIAL_RTO,
            min_rto: DEFAULT_MIN_RTO,
            fin_repeats: 1,
            loss_seed: None,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SackStreamError::InvalidConfig("chunk_size must be non-zero".into()));
        }
        if self.chunk_size > self.max_datagram {
            return Err(SackStreamError::InvalidConfig(format!(
                "chunk_size {} exceeds max_datagram {}",
                self.chunk_size, self.max_datagram
            )));
        }
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(SackStreamError::InvalidConfig(format!(
                "loss probability {} outside [0, 1]",
                self.loss_probability
            )));
        }
        if self.receive_window == 0 {
            return Err(SackStreamError::InvalidConfig(
                "receive_window must be non-zero".into(),
            ));
        }
        if let CongestionMode::Fixed { packets: 0 } = self.congestion {
            return Err(SackStreamError::InvalidConfig(
                "fixed window needs at least one packet".into(),
            ));
        }
        Ok(())
    }
}
