//! # OptimizeOptions
//!
//! The resolved configuration of one grid dispatch: the axes of the grid,
//! how many times each cell is run, the elite pool size, the degree of
//! parallelism and how much is logged.
//!
//! ## Example
//!
//! ```rust
//! use harvest_search::dispatch::{LogLevel, OptimizeOptions};
//!
//! let options = OptimizeOptions::builder()
//!     .best_of(4)
//!     .first_thin_periods(vec![None, Some(2), Some(3)])
//!     .rotation_lengths(vec![8, 10])
//!     .discount_rates(vec![0.04, 0.06])
//!     .log_level(LogLevel::Minimal)
//!     .build();
//!
//! assert!(options.validate().is_ok());
//! assert_eq!(options.get_best_of(), 4);
//! ```

use std::time::Duration;

use crate::error::{Result, SearchError};
use crate::heuristic::{HarvestPeriodSelection, TimberObjective};
use crate::trajectory::{HarvestPeriod, NO_HARVEST};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// Dispatch summary, progress and per-run events.
    Verbose,
    /// Dispatch summary and progress.
    #[default]
    Minimal,
    None,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizeOptions {
    best_of: usize,
    discount_rates: Vec<f64>,
    /// `None` entries stand for "no thin".
    first_thin_periods: Vec<Option<HarvestPeriod>>,
    second_thin_periods: Vec<Option<HarvestPeriod>>,
    third_thin_periods: Vec<Option<HarvestPeriod>>,
    rotation_lengths: Vec<HarvestPeriod>,
    solution_pool_size: usize,
    /// Worker threads; 0 uses the rayon default.
    threads: usize,
    /// Base of every run's seed; drawn from entropy when absent.
    base_seed: Option<u64>,
    objective: TimberObjective,
    harvest_period_selection: HarvestPeriodSelection,
    /// Seed construction from a random elite of the cell's pool.
    chain_from_pool: bool,
    progress_interval: Duration,
    log_level: LogLevel,
}

impl OptimizeOptions {
    pub fn get_best_of(&self) -> usize {
        self.best_of
    }

    pub fn get_discount_rates(&self) -> &[f64] {
        &self.discount_rates
    }

    pub fn get_first_thin_periods(&self) -> &[Option<HarvestPeriod>] {
        &self.first_thin_periods
    }

    pub fn get_second_thin_periods(&self) -> &[Option<HarvestPeriod>] {
        &self.second_thin_periods
    }

    pub fn get_third_thin_periods(&self) -> &[Option<HarvestPeriod>] {
        &self.third_thin_periods
    }

    pub fn get_rotation_lengths(&self) -> &[HarvestPeriod] {
        &self.rotation_lengths
    }

    pub fn get_solution_pool_size(&self) -> usize {
        self.solution_pool_size
    }

    pub fn get_threads(&self) -> usize {
        self.threads
    }

    pub fn get_base_seed(&self) -> Option<u64> {
        self.base_seed
    }

    pub fn get_objective(&self) -> TimberObjective {
        self.objective
    }

    pub fn get_harvest_period_selection(&self) -> HarvestPeriodSelection {
        self.harvest_period_selection
    }

    pub fn get_chain_from_pool(&self) -> bool {
        self.chain_from_pool
    }

    pub fn get_progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn get_log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Sets how many runs each cell gets.
    pub fn set_best_of(&mut self, best_of: usize) {
        self.best_of = best_of;
    }

    pub fn set_discount_rates(&mut self, discount_rates: Vec<f64>) {
        self.discount_rates = discount_rates;
    }

    pub fn set_first_thin_periods(&mut self, periods: Vec<Option<HarvestPeriod>>) {
        self.first_thin_periods = periods;
    }

    pub fn set_second_thin_periods(&mut self, periods: Vec<Option<HarvestPeriod>>) {
        self.second_thin_periods = periods;
    }

    pub fn set_third_thin_periods(&mut self, periods: Vec<Option<HarvestPeriod>>) {
        self.third_thin_periods = periods;
    }

    pub fn set_rotation_lengths(&mut self, rotation_lengths: Vec<HarvestPeriod>) {
        self.rotation_lengths = rotation_lengths;
    }

    pub fn set_solution_pool_size(&mut self, size: usize) {
        self.solution_pool_size = size;
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads;
    }

    pub fn set_base_seed(&mut self, seed: Option<u64>) {
        self.base_seed = seed;
    }

    pub fn set_objective(&mut self, objective: TimberObjective) {
        self.objective = objective;
    }

    pub fn set_harvest_period_selection(&mut self, selection: HarvestPeriodSelection) {
        self.harvest_period_selection = selection;
    }

    pub fn set_chain_from_pool(&mut self, chain: bool) {
        self.chain_from_pool = chain;
    }

    pub fn set_progress_interval(&mut self, interval: Duration) {
        self.progress_interval = interval;
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    /// Checks every option before any run starts.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.best_of == 0 {
            return Err(SearchError::Configuration(
                "BestOf must be greater than 0".to_string(),
            ));
        }
        if self.solution_pool_size == 0 {
            return Err(SearchError::Configuration(
                "Solution pool size must be greater than 0".to_string(),
            ));
        }
        if self.discount_rates.is_empty() {
            return Err(SearchError::Configuration(
                "At least one discount rate is required".to_string(),
            ));
        }
        if let Some(rate) = self
            .discount_rates
            .iter()
            .find(|rate| !rate.is_finite() || **rate <= -1.0)
        {
            return Err(SearchError::Configuration(format!(
                "Discount rates must be finite and greater than -1, got {}",
                rate
            )));
        }
        if self.rotation_lengths.is_empty() {
            return Err(SearchError::Configuration(
                "At least one rotation length is required".to_string(),
            ));
        }
        if self.rotation_lengths.contains(&0) {
            return Err(SearchError::Configuration(
                "Rotation lengths must be greater than 0".to_string(),
            ));
        }
        for (name, periods) in [
            ("First", &self.first_thin_periods),
            ("Second", &self.second_thin_periods),
            ("Third", &self.third_thin_periods),
        ] {
            if periods.is_empty() {
                return Err(SearchError::Configuration(format!(
                    "{} thin periods must list at least one entry; use None for no thin",
                    name
                )));
            }
            if periods.contains(&Some(NO_HARVEST)) {
                return Err(SearchError::Configuration(format!(
                    "{} thin periods must not contain period {}, which is reserved for no harvest",
                    name, NO_HARVEST
                )));
            }
        }
        if self.progress_interval.is_zero() {
            return Err(SearchError::Configuration(
                "Progress interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a builder for creating an `OptimizeOptions` instance.
    pub fn builder() -> OptimizeOptionsBuilder {
        OptimizeOptionsBuilder::default()
    }
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            best_of: 1,
            discount_rates: vec![0.04],
            first_thin_periods: vec![None],
            second_thin_periods: vec![None],
            third_thin_periods: vec![None],
            rotation_lengths: vec![10],
            solution_pool_size: 4,
            threads: 0,
            base_seed: None,
            objective: TimberObjective::LandExpectationValue,
            harvest_period_selection: HarvestPeriodSelection::NoneOrLast,
            chain_from_pool: false,
            progress_interval: Duration::from_secs(30),
            log_level: LogLevel::Minimal,
        }
    }
}

/// Builder for `OptimizeOptions`.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptionsBuilder {
    best_of: Option<usize>,
    discount_rates: Option<Vec<f64>>,
    first_thin_periods: Option<Vec<Option<HarvestPeriod>>>,
    second_thin_periods: Option<Vec<Option<HarvestPeriod>>>,
    third_thin_periods: Option<Vec<Option<HarvestPeriod>>>,
    rotation_lengths: Option<Vec<HarvestPeriod>>,
    solution_pool_size: Option<usize>,
    threads: Option<usize>,
    base_seed: Option<u64>,
    objective: Option<TimberObjective>,
    harvest_period_selection: Option<HarvestPeriodSelection>,
    chain_from_pool: Option<bool>,
    progress_interval: Option<Duration>,
    log_level: Option<LogLevel>,
}

impl OptimizeOptionsBuilder {
    pub fn best_of(mut self, value: usize) -> Self {
        self.best_of = Some(value);
        self
    }

    pub fn discount_rates(mut self, value: Vec<f64>) -> Self {
        self.discount_rates = Some(value);
        self
    }

    pub fn first_thin_periods(mut self, value: Vec<Option<HarvestPeriod>>) -> Self {
        self.first_thin_periods = Some(value);
        self
    }

    pub fn second_thin_periods(mut self, value: Vec<Option<HarvestPeriod>>) -> Self {
        self.second_thin_periods = Some(value);
        self
    }

    pub fn third_thin_periods(mut self, value: Vec<Option<HarvestPeriod>>) -> Self {
        self.third_thin_periods = Some(value);
        self
    }

    pub fn rotation_lengths(mut self, value: Vec<HarvestPeriod>) -> Self {
        self.rotation_lengths = Some(value);
        self
    }

    pub fn solution_pool_size(mut self, value: usize) -> Self {
        self.solution_pool_size = Some(value);
        self
    }

    pub fn threads(mut self, value: usize) -> Self {
        self.threads = Some(value);
        self
    }

    pub fn base_seed(mut self, value: u64) -> Self {
        self.base_seed = Some(value);
        self
    }

    pub fn objective(mut self, value: TimberObjective) -> Self {
        self.objective = Some(value);
        self
    }

    pub fn harvest_period_selection(mut self, value: HarvestPeriodSelection) -> Self {
        self.harvest_period_selection = Some(value);
        self
    }

    pub fn chain_from_pool(mut self, value: bool) -> Self {
        self.chain_from_pool = Some(value);
        self
    }

    pub fn progress_interval(mut self, value: Duration) -> Self {
        self.progress_interval = Some(value);
        self
    }

    pub fn log_level(mut self, value: LogLevel) -> Self {
        self.log_level = Some(value);
        self
    }

    /// Builds the options, defaulting anything not set.
    pub fn build(self) -> OptimizeOptions {
        let default = OptimizeOptions::default();
        OptimizeOptions {
            best_of: self.best_of.unwrap_or(default.best_of),
            discount_rates: self.discount_rates.unwrap_or(default.discount_rates),
            first_thin_periods: self.first_thin_periods.unwrap_or(default.first_thin_periods),
            second_thin_periods: self
                .second_thin_periods
                .unwrap_or(default.second_thin_periods),
            third_thin_periods: self.third_thin_periods.unwrap_or(default.third_thin_periods),
            rotation_lengths: self.rotation_lengths.unwrap_or(default.rotation_lengths),
            solution_pool_size: self.solution_pool_size.unwrap_or(default.solution_pool_size),
            threads: self.threads.unwrap_or(default.threads),
            base_seed: self.base_seed.or(default.base_seed),
            objective: self.objective.unwrap_or(default.objective),
            harvest_period_selection: self
                .harvest_period_selection
                .unwrap_or(default.harvest_period_selection),
            chain_from_pool: self.chain_from_pool.unwrap_or(default.chain_from_pool),
            progress_interval: self.progress_interval.unwrap_or(default.progress_interval),
            log_level: self.log_level.unwrap_or(default.log_level),
        }
    }
}
