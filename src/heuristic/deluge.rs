//! # Great deluge
//!
//! Accepts any candidate at or above a water level that rises by a fixed
//! amount of rain every iteration. The run ends when the iteration budget is
//! spent, the water reaches its final level, or too many iterations pass
//! without an accepted move.

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::rng::Pseudorandom;
use crate::trajectory::StandTrajectory;

use super::{validate_probability, Heuristic, HeuristicCore, RunParameters};

/// Rain per iteration as a share of the initial water level when no rain
/// rate is configured.
const DEFAULT_RAIN_SPEED: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GreatDelugeParameters {
    /// Iteration cap; defaults to ten iterations per tree.
    pub iterations: Option<usize>,
    /// Starting water level; defaults to the constructed objective.
    pub initial_water_level: Option<f64>,
    /// Rise per iteration; defaults to 0.1% of the initial level.
    pub rain_rate: Option<f64>,
    pub final_water_level: Option<f64>,
    /// Consecutive rejected moves that end the run.
    pub stop_after: Option<usize>,
    pub initial_thinning_probability: f64,
}

impl Default for GreatDelugeParameters {
    fn default() -> Self {
        Self {
            iterations: None,
            initial_water_level: None,
            rain_rate: None,
            final_water_level: None,
            stop_after: None,
            initial_thinning_probability: 0.5,
        }
    }
}

impl GreatDelugeParameters {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_water_levels(mut self, initial: f64, rain_rate: f64, final_level: f64) -> Self {
        self.initial_water_level = Some(initial);
        self.rain_rate = Some(rain_rate);
        self.final_water_level = Some(final_level);
        self
    }

    pub fn with_rain_rate(mut self, rain_rate: f64) -> Self {
        self.rain_rate = Some(rain_rate);
        self
    }

    pub fn with_stop_after(mut self, stop_after: usize) -> Self {
        self.stop_after = Some(stop_after);
        self
    }

    pub fn with_initial_thinning_probability(mut self, probability: f64) -> Self {
        self.initial_thinning_probability = probability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == Some(0) {
            return Err(SearchError::Configuration(
                "Great deluge iterations must be greater than 0".to_string(),
            ));
        }
        if self.stop_after == Some(0) {
            return Err(SearchError::Configuration(
                "Stop after must be greater than 0".to_string(),
            ));
        }
        if let Some(rain_rate) = self.rain_rate {
            if !rain_rate.is_finite() || rain_rate < 0.0 {
                return Err(SearchError::Configuration(format!(
                    "Rain rate must be a non-negative number, got {}",
                    rain_rate
                )));
            }
        }
        for level in [self.initial_water_level, self.final_water_level]
            .into_iter()
            .flatten()
        {
            if !level.is_finite() {
                return Err(SearchError::InvalidNumericValue(format!(
                    "Water level {} is not finite",
                    level
                )));
            }
        }
        validate_probability("Initial thinning probability", self.initial_thinning_probability)
    }
}

#[derive(Debug, Clone)]
pub struct GreatDeluge<T: StandTrajectory> {
    core: HeuristicCore<T>,
    parameters: GreatDelugeParameters,
    water_level: f64,
}

impl<T: StandTrajectory> GreatDeluge<T> {
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn new(stand: &T, parameters: GreatDelugeParameters, rng: Pseudorandom) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            core: HeuristicCore::new(stand, rng),
            parameters,
            water_level: f64::NEG_INFINITY,
        })
    }

    pub fn parameters(&self) -> &GreatDelugeParameters {
        &self.parameters
    }

    /// Water level at the end of the last run.
    pub fn water_level(&self) -> f64 {
        self.water_level
    }
}

impl<T: StandTrajectory> Heuristic<T> for GreatDeluge<T> {
    fn name(&self) -> &'static str {
        "great deluge"
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
                "Great deluge moves between at most two thins, {} configured",
                run.thinning_periods.len()
            )));
        }
        Ok(())
    }

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        let iterations = self
            .parameters
            .iterations
            .unwrap_or(10 * self.core.current.tree_count());
        self.water_level = self
            .parameters
            .initial_water_level
            .unwrap_or(self.core.current_objective);
        let rain_rate = self
            .parameters
            .rain_rate
            .unwrap_or(DEFAULT_RAIN_SPEED * self.water_level.abs());

        let mut since_acceptance = 0;
        for _ in 0..iterations {
            if self
                .parameters
                .final_water_level
                .is_some_and(|final_level| self.water_level >= final_level)
            {
                break;
            }
            let level = self.water_level;
            let Some((tree, candidate_objective, accepted)) = self
                .core
                .try_one_opt_move(|candidate| candidate >= level, counters)
            else {
                break;
            };
            self.core
                .moves
                .push(self.core.current_objective, candidate_objective, Some(tree));

            if accepted {
                since_acceptance = 0;
            } else {
                since_acceptance += 1;
                if self
                    .parameters
                    .stop_after
                    .is_some_and(|stop_after| since_acceptance >= stop_after)
                {
                    break;
                }
            }
            self.water_level += rain_rate;
        }
        Ok(())
    }
}
