//! Congestion control module.
//!
//! Defines the `CongestionController` trait and provides AIMD with slow start
//! as the default algorithm, plus a constant window for throughput runs.

pub mod aimd;
pub mod fixed;

/// Trait for pluggable congestion control algorithms.
///
/// Implementations only size the window. In-flight accounting is done by the
/// sender, which compares its in-flight bytes against [`window`].
///
/// [`window`]: CongestionController::window
pub trait CongestionController: Send {
    /// `freed` payload bytes were newly acknowledged.
    fn on_ack(&mut self, freed: u64);

    /// The retransmission timer expired.
    fn on_timeout(&mut self);

    /// Current congestion window in bytes, floored.
    fn window(&self) -> u64;

    /// Current slow-start threshold in bytes.
    fn ssthresh(&self) -> u64;

    /// Whether the controller is still in slow start.
    fn in_slow_start(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
