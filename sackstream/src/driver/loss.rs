//! Simulated packet loss for exercising retransmission on a clean link.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Drops each packet independently with a fixed probability.
#[derive(Debug)]
pub struct LossSimulator {
    probability: f64,
    rng: StdRng,
    dropped: u64,
}

impl LossSimulator {
    /// A fixed `seed` makes the drop pattern reproducible.
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng,
            dropped: 0,
        }
    }

    /// Roll for one packet.
    pub fn should_drop(&mut self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        let drop = self.rng.random::<f64>() < self.probability;
        if drop {
            self.dropped += 1;
        }
        drop
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
