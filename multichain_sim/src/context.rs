//! Simulation context: the logical clock and the run's single RNG stream.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::ops::RangeInclusive;

/// Deterministic time and randomness for one run.
///
/// - A logical clock that only moves forward, advanced by the scheduler
///   when it dispatches an event
/// - A seeded ChaCha8 RNG that every random draw of the run goes through
///   (delays, teleports, hop selection)
pub struct SimContext {
    /// Master seed for this run
    seed: u64,

    /// Current logical time
    now: u64,

    /// Single RNG stream for the run
    rng: ChaCha8Rng,
}

impl SimContext {
    /// Creates a context at time zero with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            now: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Returns the current logical time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Moves the clock to `time`. The clock never moves backwards.
    pub fn advance_to(&mut self, time: u64) {
        debug_assert!(time >= self.now, "clock moved backwards: {} -> {}", self.now, time);
        self.now = self.now.max(time);
    }

    /// Draws a uniform integer from `range`.
    pub fn uniform(&mut self, range: &RangeInclusive<u64>) -> u64 {
        self.rng.gen_range(range.clone())
    }

    /// Mutable access to the RNG for protocol handlers.
    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Returns the master seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
