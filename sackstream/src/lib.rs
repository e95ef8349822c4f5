//! SackStream -- reliable, in-order byte streams over UDP.
//!
//! The sender cuts a byte stream into fixed-size chunks addressed by byte
//! range. The receiver reassembles whatever arrives, in any order and with any
//! overlap, and answers each datagram with a cumulative range plus selective
//! acknowledgments of everything buffered beyond it. The sender paces itself
//! with an AIMD congestion window and retransmits from the oldest
//! unacknowledged chunk when its RTT-derived timer expires.
//!
//! The protocol core (`reassembly`, `receiver`, `window`, `congestion`, `rtt`,
//! `sender`) is synchronous and takes time as an explicit argument. The
//! `driver` module runs it over tokio UDP sockets.

pub mod config;
pub mod congestion;
pub mod driver;
pub mod error;
pub mod frame;
pub mod range;
pub mod reassembly;
pub mod receiver;
pub mod rtt;
pub mod sender;
pub mod timer;
pub mod window;

// Re-export key public types at crate root.
pub use config::{CongestionMode, TransportConfig};
pub use driver::receiver::{ReceiveReport, Receiver};
pub use driver::sender::{run_sender, SendReport};
pub use driver::sink::{DeliverySink, FileSink, MemorySink};
pub use error::{Result, SackStreamError};
pub use frame::Frame;
pub use range::ByteRange;
pub use reassembly::SegmentStore;
pub use receiver::{Delivery, ReceiverAdapter};
pub use rtt::RttEstimator;
pub use sender::{SenderProtocol, Transmit};
pub use window::{SendDecision, WindowTracker};
