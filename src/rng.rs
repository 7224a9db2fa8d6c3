//! # Pseudorandom
//!
//! The `Pseudorandom` struct wraps the `rand` crate's `StdRng` and exposes the
//! draws the heuristics need: byte-scaled values for tree selection,
//! probabilities and uniform indices.
//!
//! Every run owns one stream. Streams are derived from a base seed, the grid
//! position and the BestOf index so that a dispatch is reproducible no matter
//! how the worker threads interleave.
//!
//! ## Example
//!
//! ```rust
//! use harvest_search::rng::Pseudorandom;
//!
//! let mut rng = Pseudorandom::from_seed(42);
//! let tree = rng.tree_index(100);
//! assert!(tree < 100);
//! ```

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// Keeps scaled two-byte draws strictly below the tree count.
const ROUND_TOWARDS_ZERO_TOLERANCE: f32 = 0.001;

/// A wrapper around `StdRng` providing the draws used by the heuristics.
#[derive(Clone, Debug)]
pub struct Pseudorandom {
    pub rng: StdRng,
}

impl Pseudorandom {
    /// Creates a new `Pseudorandom` instance seeded from system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a new `Pseudorandom` instance with a specific seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derives the stream for one run.
    ///
    /// # Arguments
    ///
    /// * `base_seed` - The dispatch-wide seed.
    /// * `position_key` - A key unique to the grid position.
    /// * `best_of_index` - Which of the BestOf repetitions this run is.
    pub fn for_run(base_seed: u64, position_key: u64, best_of_index: usize) -> Self {
        let mut state = base_seed;
        let mut seed = split_mix(&mut state);
        state ^= position_key;
        seed ^= split_mix(&mut state);
        state ^= best_of_index as u64;
        seed ^= split_mix(&mut state).rotate_left(17);
        Self::from_seed(seed)
    }

    /// Returns two random bytes as a float in `0.0..=65535.0`.
    pub fn two_bytes_as_float(&mut self) -> f32 {
        let mut bytes = [0u8; 2];
        self.rng.fill_bytes(&mut bytes);
        u16::from_le_bytes(bytes) as f32
    }

    /// Picks a tree index in `0..tree_count` by scaling two random bytes.
    pub fn tree_index(&mut self, tree_count: usize) -> usize {
        if tree_count == 0 {
            return 0;
        }
        let scale = (tree_count as f32 - ROUND_TOWARDS_ZERO_TOLERANCE) / u16::MAX as f32;
        let index = (scale * self.two_bytes_as_float()) as usize;
        index.min(tree_count - 1)
    }

    /// Returns a probability in `[0, 1)`.
    pub fn probability(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Returns `true` with the given probability.
    pub fn chance(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.probability() < probability
    }

    /// Returns a uniformly distributed index in `0..upper`.
    pub fn index(&mut self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        self.rng.gen_range(0..upper)
    }
}

impl Default for Pseudorandom {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn split_mix(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
