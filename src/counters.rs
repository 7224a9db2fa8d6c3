//! # Performance counters
//!
//! Every run reports what it spent: moves accepted and rejected, growth model
//! timesteps simulated, trees randomized while constructing the starting
//! selection, and wall clock duration. The dispatcher sums them per grid cell
//! and across the whole dispatch.

use std::ops::{Add, AddAssign};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceCounters {
    pub moves_accepted: usize,
    pub moves_rejected: usize,
    pub growth_model_timesteps: usize,
    pub trees_randomized_in_construction: usize,
    pub duration: Duration,
}

impl PerformanceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total moves evaluated.
    pub fn moves(&self) -> usize {
        self.moves_accepted + self.moves_rejected
    }

    /// Share of moves accepted, or `None` before any move was made.
    pub fn acceptance_rate(&self) -> Option<f64> {
        let moves = self.moves();
        (moves > 0).then(|| self.moves_accepted as f64 / moves as f64)
    }
}

impl AddAssign for PerformanceCounters {
    fn add_assign(&mut self, other: Self) {
        self.moves_accepted += other.moves_accepted;
        self.moves_rejected += other.moves_rejected;
        self.growth_model_timesteps += other.growth_model_timesteps;
        self.trees_randomized_in_construction += other.trees_randomized_in_construction;
        self.duration += other.duration;
    }
}

impl Add for PerformanceCounters {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}
