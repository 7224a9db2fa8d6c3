//! # Threshold accepting
//!
//! A sequence of stages, each with a threshold multiplier and an iteration
//! count. Every iteration moves one random tree to another period and keeps
//! the move if the candidate objective exceeds the threshold times the
//! accepted objective. Multipliers just below one allow small losses.

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::rng::Pseudorandom;
use crate::trajectory::StandTrajectory;

use super::{validate_probability, Heuristic, HeuristicCore, RunParameters};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdParameters {
    /// Iterations per stage. When empty, the three default stages run
    /// 11.5, 25 and 7.5 iterations per tree; other stage counts run one
    /// iteration per tree each.
    pub iterations_per_threshold: Vec<usize>,
    pub thresholds: Vec<f64>,
    pub initial_thinning_probability: f64,
}

impl Default for ThresholdParameters {
    fn default() -> Self {
        Self {
            iterations_per_threshold: Vec::new(),
            thresholds: vec![1.0, 0.999, 1.0],
            initial_thinning_probability: 0.5,
        }
    }
}

impl ThresholdParameters {
    /// Replaces the stages.
    pub fn with_stages(mut self, stages: &[(f64, usize)]) -> Self {
        self.thresholds = stages.iter().map(|&(threshold, _)| threshold).collect();
        self.iterations_per_threshold = stages.iter().map(|&(_, iterations)| iterations).collect();
        self
    }

    pub fn with_initial_thinning_probability(mut self, probability: f64) -> Self {
        self.initial_thinning_probability = probability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(SearchError::Configuration(
                "At least one threshold is required".to_string(),
            ));
        }
        if let Some(threshold) = self
            .thresholds
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(SearchError::Configuration(format!(
                "Thresholds must be between 0 and 1, got {}",
                threshold
            )));
        }
        if !self.iterations_per_threshold.is_empty()
            && self.iterations_per_threshold.len() != self.thresholds.len()
        {
            return Err(SearchError::Configuration(format!(
                "{} thresholds but {} iteration counts",
                self.thresholds.len(),
                self.iterations_per_threshold.len()
            )));
        }
        validate_probability("Initial thinning probability", self.initial_thinning_probability)
    }

    /// (threshold, iterations) per stage for a stand of `tree_count` trees.
    pub fn stages(&self, tree_count: usize) -> Vec<(f64, usize)> {
        let iterations = if !self.iterations_per_threshold.is_empty() {
            self.iterations_per_threshold.clone()
        } else if self.thresholds.len() == 3 {
            let n = tree_count as f64;
            vec![(11.5 * n) as usize, 25, (7.5 * n) as usize]
        } else {
            vec![tree_count; self.thresholds.len()]
        };
        self.thresholds.iter().copied().zip(iterations).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdAccepting<T: StandTrajectory> {
    core: HeuristicCore<T>,
    parameters: ThresholdParameters,
}

impl<T: StandTrajectory> ThresholdAccepting<T> {
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn new(stand: &T, parameters: ThresholdParameters, rng: Pseudorandom) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            core: HeuristicCore::new(stand, rng),
            parameters,
        })
    }

    pub fn parameters(&self) -> &ThresholdParameters {
        &self.parameters
    }
}

impl<T: StandTrajectory> Heuristic<T> for ThresholdAccepting<T> {
    fn name(&self) -> &'static str {
        "threshold accepting"
    }

    fn core(&self) -> &HeuristicCore<T> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HeuristicCore<T> {
        &mut self.core
    }

    fn initial_thinning_probability(&self) -> f64 {
        self.parameters.initial_thinning_probability
    }

    fn check_supported(&self, run: &RunParameters) -> Result<()> {
        if run.thinning_periods.len() > 2 {
            return Err(SearchError::NotSupported(format!(
                "Threshold accepting moves between at most two thins, {} configured",
                run.thinning_periods.len()
            )));
        }
        Ok(())
    }

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        let stages = self.parameters.stages(self.core.current.tree_count());
        for (threshold, iterations) in stages {
            for _ in 0..iterations {
                let bound = threshold * self.core.current_objective;
                let Some((tree, candidate_objective, _)) = self
                    .core
                    .try_one_opt_move(|candidate| candidate > bound, counters)
                else {
                    return Ok(());
                };
                self.core
                    .moves
                    .push(self.core.current_objective, candidate_objective, Some(tree));
            }
        }
        Ok(())
    }
}
