//! RTT estimation using the Jacobson/Karels algorithm.
//!
//! SRTT   = 7/8 * SRTT   + 1/8 * sample
//! RTTVAR = 3/4 * RTTVAR + 1/4 * |SRTT - sample|
//! RTO    = SRTT + 4 * RTTVAR, floored at `min_rto`
//!
//! State is kept in seconds as `f64` so sub-microsecond samples on loopback
//! do not collapse to zero.

use std::time::Duration;

/// Default RTO floor: 5 ms.
pub const DEFAULT_MIN_RTO: Duration = Duration::from_millis(5);
/// RTO used before the first sample arrives.
pub const DEFAULT_INITIAL_RTO: Duration = Duration::from_secs(1);

const ALPHA: f64 = 1.0 / 8.0;
const BETA: f64 = 1.0 / 4.0;

/// RTT estimator implementing Jacobson/Karels smoothing.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT, seconds.
    srtt: Option<f64>,
    /// RTT variance, seconds.
    rttvar: Option<f64>,
    initial_rto: Duration,
    min_rto: Duration,
}

impl RttEstimator {
    /// Create an estimator with a 1 s initial RTO and a 5 ms floor.
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_INITIAL_RTO, DEFAULT_MIN_RTO)
    }

    pub fn with_bounds(initial_rto: Duration, min_rto: Duration) -> Self {
        Self {
            srtt: None,
            rttvar: None,
            initial_rto,
            min_rto,
        }
    }

    /// Update the estimator with a new RTT sample.
    pub fn update(&mut self, sample: Duration) {
        let s = sample.as_secs_f64();
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let err = (s - srtt).abs();
                self.srtt = Some((1.0 - ALPHA) * srtt + ALPHA * s);
                self.rttvar = Some((1.0 - BETA) * rttvar + BETA * err);
            }
            _ => {
                self.srtt = Some(s);
                self.rttvar = Some(s / 2.0);
            }
        }
    }

    /// Returns the current smoothed RTT, or `None` if no samples yet.
    pub fn srtt(&self) -> Option<Duration> {
        self.srtt.map(Duration::from_secs_f64)
    }

    /// Returns the current RTT variance, or `None` if no samples yet.
    pub fn rttvar(&self) -> Option<Duration> {
        self.rttvar.map(Duration::from_secs_f64)
    }

    /// Returns the current retransmission timeout.
    pub fn rto(&self) -> Duration {
        match (self.srtt, self.rttvar) {
            (Some(srtt), Some(rttvar)) => {
                let rto = srtt + 4.0 * rttvar;
                if rto <= self.min_rto.as_secs_f64() {
                    return self.min_rto;
                }
                Duration::try_from_secs_f64(rto).unwrap_or(Duration::MAX)
            }
            _ => self.initial_rto,
        }
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rto_before_samples() {
        let est = RttEstimator::new();
        assert_eq!(est.rto(), Duration::from_secs(1));
        assert!(est.srtt().is_none());
    }

    #[test]
    fn first_sample_initializes() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_millis(100));
        assert_eq!(est.srtt(), Some(Duration::from_millis(100)));
        assert_eq!(est.rttvar(), Some(Duration::from_millis(50)));
        assert_eq!(est.rto(), Duration::from_millis(300));
    }

    #[test]
    fn subsequent_samples_smooth() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_millis(100));
        est.update(Duration::from_millis(120));

        // SRTT = 7/8 * 100 + 1/8 * 120 = 102.5ms
        let srtt = est.srtt().unwrap().as_secs_f64() * 1000.0;
        assert!((srtt - 102.5).abs() < 1e-6, "srtt = {srtt}");
        // RTTVAR = 3/4 * 50 + 1/4 * 20 = 42.5ms
        let var = est.rttvar().unwrap().as_secs_f64() * 1000.0;
        assert!((var - 42.5).abs() < 1e-6, "rttvar = {var}");
    }

    #[test]
    fn rto_floored() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_micros(100));
        assert_eq!(est.rto(), DEFAULT_MIN_RTO);
    }

    #[test]
    fn large_rtt_not_clamped() {
        let mut est = RttEstimator::new();
        est.update(Duration::from_secs(100));
        assert_eq!(est.rto(), Duration::from_secs(300));
    }
}
