//! Deterministic random number generation.
//!
//! Every parallel phase draws one seed per population slot from the top-level
//! generator *before* dispatch, so the random decisions of slot `k` do not
//! depend on how rayon schedules the slots.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random generator used throughout the crate.
pub type RandomGenerator = StdRng;

/// Creates a seeded generator.
pub fn create_rng(seed: u64) -> RandomGenerator {
    StdRng::seed_from_u64(seed)
}

/// Draws `n` slot seeds from `rng`.
pub fn draw_seeds<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<u64> {
    (0..n).map(|_| rng.random()).collect()
}
