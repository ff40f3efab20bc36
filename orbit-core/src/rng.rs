//! Centralized seeded RNG.
//!
//! Every source of randomness in a run descends from one master seed, and
//! that seed is applied exactly once. A second seeding attempt is an engine
//! failure — re-seeding mid-run is how non-determinism sneaks in.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Single seeding point for a run.
#[derive(Debug)]
pub struct SeedBank {
    master_seed: u64,
    seeded: bool,
}

/// Raised on a second seeding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("RNG already seeded with {0}; re-seeding is forbidden")]
pub struct ReseedError(pub u64);

impl SeedBank {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            seeded: false,
        }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Hand out the run's RNG. Callable exactly once.
    pub fn seed_once(&mut self) -> Result<StdRng, ReseedError> {
        if self.seeded {
            return Err(ReseedError(self.master_seed));
        }
        self.seeded = true;
        Ok(StdRng::seed_from_u64(self.master_seed))
    }
}
