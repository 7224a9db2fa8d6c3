//! # Tabu search
//!
//! Each iteration evaluates every tree against every non-current candidate
//! period and takes the best move that is not tabu. A tabu move is still
//! taken if it beats the best objective seen so far (aspiration).
//!
//! After a move is taken its (tree, period) pair stays tabu for `tenure`
//! iterations. Tenures count down by one each iteration.

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::rng::Pseudorandom;
use crate::trajectory::{HarvestPeriod, StandTrajectory};

use super::{
    validate_probability, HarvestPeriodSelection, Heuristic, HeuristicCore, RunParameters,
};

/// How long a taken move stays tabu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TabuTenure {
    /// Every move gets the same tenure.
    #[default]
    Fixed,
    /// Tenure drawn uniformly from `1..=maximum_tenure` per move.
    Stochastic,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TabuParameters {
    /// Neighborhood evaluations; defaults to the number of trees.
    pub iterations: Option<usize>,
    /// Fixed tenure; defaults to 30% of the number of trees.
    pub tenure: Option<usize>,
    /// Upper bound of stochastic tenure; defaults to the fixed tenure.
    pub maximum_tenure: Option<usize>,
    pub tenure_mode: TabuTenure,
    /// Iterations without a new best before the current selection is
    /// perturbed. `None` disables escapes.
    pub escape_after: Option<usize>,
    /// Trees reassigned at random when escaping.
    pub escape_by: usize,
    pub initial_thinning_probability: f64,
}

impl Default for TabuParameters {
    fn default() -> Self {
        Self {
            iterations: None,
            tenure: None,
            maximum_tenure: None,
            tenure_mode: TabuTenure::Fixed,
            escape_after: None,
            escape_by: 0,
            initial_thinning_probability: 0.5,
        }
    }
}

impl TabuParameters {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_tenure(mut self, tenure: usize) -> Self {
        self.tenure = Some(tenure);
        self
    }

    pub fn with_stochastic_tenure(mut self, maximum_tenure: usize) -> Self {
        self.tenure_mode = TabuTenure::Stochastic;
        self.maximum_tenure = Some(maximum_tenure);
        self
    }

    pub fn with_escape(mut self, escape_after: usize, escape_by: usize) -> Self {
        self.escape_after = Some(escape_after);
        self.escape_by = escape_by;
        self
    }

    pub fn with_initial_thinning_probability(mut self, probability: f64) -> Self {
        self.initial_thinning_probability = probability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == Some(0) {
            return Err(SearchError::Configuration(
                "Tabu iterations must be greater than 0".to_string(),
            ));
        }
        if self.tenure_mode == TabuTenure::Stochastic && self.maximum_tenure == Some(0) {
            return Err(SearchError::Configuration(
                "Maximum tabu tenure must be greater than 0".to_string(),
            ));
        }
        if self.escape_after == Some(0) {
            return Err(SearchError::Configuration(
                "Escape interval must be greater than 0".to_string(),
            ));
        }
        validate_probability("Initial thinning probability", self.initial_thinning_probability)
    }
}

#[derive(Debug, Clone, Copy)]
struct TabuMove {
    tree: usize,
    period_index: usize,
    objective: f64,
}

#[derive(Debug, Clone)]
pub struct TabuSearch<T: StandTrajectory> {
    core: HeuristicCore<T>,
    parameters: TabuParameters,
    remaining_tenure: Vec<usize>,
    period_count: usize,
}

impl<T: StandTrajectory> TabuSearch<T> {
    /// Creates a tabu search over copies of `stand`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn new(stand: &T, parameters: TabuParameters, rng: Pseudorandom) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            core: HeuristicCore::new(stand, rng),
            parameters,
            remaining_tenure: Vec::new(),
            period_count: 0,
        })
    }

    pub fn parameters(&self) -> &TabuParameters {
        &self.parameters
    }

    fn fixed_tenure(&self) -> usize {
        self.parameters
            .tenure
            .unwrap_or((0.3 * self.core.current.tree_count() as f64) as usize)
    }

    fn next_tenure(&mut self) -> usize {
        match self.parameters.tenure_mode {
            TabuTenure::Fixed => self.fixed_tenure(),
            TabuTenure::Stochastic => {
                let maximum = self
                    .parameters
                    .maximum_tenure
                    .unwrap_or_else(|| self.fixed_tenure())
                    .max(1);
                1 + self.core.rng.index(maximum)
            }
        }
    }

    /// Iterations remaining before moving `tree` to `period` stops being tabu.
    pub fn remaining_tenure(&self, tree: usize, period: HarvestPeriod) -> usize {
        self.core
            .current
            .valid_harvest_periods()
            .iter()
            .position(|&p| p == period)
            .map_or(0, |index| {
                self.remaining_tenure
                    .get(tree * self.period_count + index)
                    .copied()
                    .unwrap_or(0)
            })
    }

    fn reset_tenure(&mut self) {
        self.period_count = self.core.current.valid_harvest_periods().len();
        self.remaining_tenure = vec![0; self.core.current.tree_count() * self.period_count];
    }

    fn candidate_period_indices(&self) -> Vec<usize> {
        let last = self.period_count.saturating_sub(1);
        match self.core.run.harvest_period_selection {
            HarvestPeriodSelection::NoneOrLast => vec![0, last],
            HarvestPeriodSelection::All => (0..self.period_count).collect(),
        }
    }

    /// One neighborhood evaluation. Returns whether a move was taken.
    fn step(&mut self, candidates: &[usize], counters: &mut PerformanceCounters) -> bool {
        let periods = self.core.current.valid_harvest_periods().to_vec();
        let mut best: Option<TabuMove> = None;
        let mut best_non_tabu: Option<TabuMove> = None;

        for tree in 0..self.core.current.tree_count() {
            let current_period = self.core.current.tree_selection(tree);
            for &period_index in candidates {
                let period = periods[period_index];
                if period == current_period {
                    continue;
                }
                self.core.candidate.set_tree_selection(tree, period);
                counters.growth_model_timesteps += self.core.candidate.simulate();
                let objective = self.core.objective(&self.core.candidate);
                self.core.candidate.set_tree_selection(tree, current_period);

                let evaluated = TabuMove {
                    tree,
                    period_index,
                    objective,
                };
                if best.map_or(true, |m| objective > m.objective) {
                    best = Some(evaluated);
                }
                let is_tabu = self.remaining_tenure[tree * self.period_count + period_index] > 0;
                if !is_tabu && best_non_tabu.map_or(true, |m| objective > m.objective) {
                    best_non_tabu = Some(evaluated);
                }
            }
        }

        for tenure in self.remaining_tenure.iter_mut().filter(|t| **t > 0) {
            *tenure -= 1;
        }

        let chosen = match best {
            Some(m) if m.objective > self.core.best_objective => Some(m),
            _ => best_non_tabu,
        };
        let candidate_objective = best.map_or(self.core.current_objective, |m| m.objective);
        match chosen {
            Some(m) => {
                self.core
                    .current
                    .set_tree_selection(m.tree, periods[m.period_index]);
                counters.growth_model_timesteps += self.core.current.simulate();
                self.core.candidate.copy_from(&self.core.current);
                self.core.current_objective = m.objective;
                let tenure = self.next_tenure();
                self.remaining_tenure[m.tree * self.period_count + m.period_index] = tenure;
                counters.moves_accepted += 1;
                self.core.update_best(m.objective);
            }
            None => counters.moves_rejected += 1,
        }
        self.core.moves.push(
            self.core.current_objective,
            candidate_objective,
            best.map(|m| m.tree),
        );
        chosen.is_some()
    }

    /// Reassigns `escape_by` random trees among the candidate periods and
    /// clears the tabu list.
    fn escape(&mut self, candidates: &[usize], counters: &mut PerformanceCounters) {
        let periods = self.core.current.valid_harvest_periods().to_vec();
        let tree_count = self.core.current.tree_count();
        for _ in 0..self.parameters.escape_by {
            let tree = self.core.rng.tree_index(tree_count);
            let period = periods[candidates[self.core.rng.index(candidates.len())]];
            self.core.current.set_tree_selection(tree, period);
        }
        self.remaining_tenure.fill(0);
        counters.growth_model_timesteps += self.core.current.simulate();
        self.core.candidate.copy_from(&self.core.current);
        self.core.current_objective = self.core.objective(&self.core.current);
        self.core.update_best(self.core.current_objective);
    }
}

impl<T: StandTrajectory> Heuristic<T> for TabuSearch<T> {
    fn name(&self) -> &'static str {
        "tabu"
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

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        self.reset_tenure();
        let tree_count = self.core.current.tree_count();
        if self.period_count < 2 || tree_count == 0 {
            return Ok(());
        }

        let iterations = self.parameters.iterations.unwrap_or(tree_count);
        let candidates = self.candidate_period_indices();
        let mut since_improvement = 0;
        for _ in 0..iterations {
            let best_before = self.core.best_objective;
            self.step(&candidates, counters);
            if self.core.best_objective > best_before {
                since_improvement = 0;
            } else {
                since_improvement += 1;
            }
            if let Some(escape_after) = self.parameters.escape_after {
                if since_improvement >= escape_after {
                    self.escape(&candidates, counters);
                    since_improvement = 0;
                }
            }
        }
        Ok(())
    }
}
