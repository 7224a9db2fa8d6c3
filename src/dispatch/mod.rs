//! # Grid dispatch
//!
//! `GridDispatcher` runs every heuristic parameter set at every valid
//! combination of discount rate, thin periods and rotation length, `BestOf`
//! times each, on a bounded rayon pool.
//!
//! Each run builds its own strategy over its own copy of the stand and owns a
//! pseudorandom stream derived from the base seed, the grid position and the
//! BestOf index, so results do not depend on how threads interleave. A run
//! touches shared state only once, when it completes: it locks the result
//! grid, merges its counters and adds its best solution and move series to
//! its cell. Strategies that evaluate all rotations and discount rates in a
//! single run are scattered into every sub-cell they cover.
//!
//! The first failing run aborts the dispatch. Its error is wrapped with the
//! grid coordinates of the run.
//!
//! ## Example
//!
//! ```rust
//! use harvest_search::dispatch::{GridDispatcher, LogLevel, OptimizeOptions};
//! use harvest_search::heuristic::threshold::ThresholdParameters;
//! use harvest_search::heuristic::HeuristicParameters;
//! use harvest_search::trajectory::TabularTrajectory;
//!
//! let stand = TabularTrajectory::synthetic(20, 10, 42);
//! let options = OptimizeOptions::builder()
//!     .best_of(2)
//!     .first_thin_periods(vec![Some(3), Some(5)])
//!     .rotation_lengths(vec![10])
//!     .base_seed(7)
//!     .log_level(LogLevel::None)
//!     .build();
//! let parameters = vec![HeuristicParameters::ThresholdAccepting(
//!     ThresholdParameters::default().with_stages(&[(1.0, 50)]),
//! )];
//!
//! let results = GridDispatcher::new(stand, parameters, options)
//!     .run()
//!     .unwrap();
//! assert_eq!(results.len(), 2);
//! assert_eq!(results.runs_completed(), 4);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};
use crate::heuristic::{Heuristic, HeuristicParameters, RunParameters};
use crate::rng::Pseudorandom;
use crate::results::{GridPosition, GridShape, HeuristicResults};
use crate::trajectory::{HarvestPeriod, StandTrajectory};

mod options;
mod workers;

pub use options::{LogLevel, OptimizeOptions, OptimizeOptionsBuilder};
pub use workers::WorkerPool;

/// Longest the dispatching thread sleeps between checks for completion.
const COMPLETION_POLL: Duration = Duration::from_millis(50);

/// One dispatched combination with its resolved periods.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchCell {
    pub position: GridPosition,
    /// Configured thins in time order.
    pub thinning_periods: Vec<HarvestPeriod>,
    /// `None` when the run covers every rotation.
    pub rotation_length: Option<HarvestPeriod>,
    /// `None` when the run covers every discount rate.
    pub discount_rate: Option<f64>,
    /// Relative cost of one run, used for progress estimates.
    pub runtime_cost: usize,
}

impl DispatchCell {
    /// Coordinates of the cell in error messages.
    fn context(&self) -> String {
        let thins = if self.thinning_periods.is_empty() {
            "none".to_string()
        } else {
            self.thinning_periods
                .iter()
                .map(|period| period.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let rotation = self
            .rotation_length
            .map_or("vectorized".to_string(), |r| r.to_string());
        let rate = self
            .discount_rate
            .map_or("vectorized".to_string(), |r| r.to_string());
        format!(
            "parameter index {}, thins [{}], rotation length {}, discount rate {}",
            self.position.parameter_index, thins, rotation, rate
        )
    }
}

/// Lets another thread stop a dispatch. Runs already started finish; runs
/// not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Relative cost of one run: the periods simulated after each thin, or the
/// whole rotation when there are none.
pub fn runtime_cost(thinning_periods: &[HarvestPeriod], rotation_length: HarvestPeriod) -> usize {
    if thinning_periods.is_empty() {
        return rotation_length as usize;
    }
    thinning_periods
        .iter()
        .map(|&thin| rotation_length.saturating_sub(thin) as usize)
        .sum()
}

/// Resolves a thin list entry, treating an out of range index as no thin.
fn thin_at(periods: &[Option<HarvestPeriod>], index: usize) -> Option<HarvestPeriod> {
    periods.get(index).copied().flatten()
}

/// Thins of a combination in time order, or `None` if the combination is
/// invalid: a thin without its predecessor, or a thin not strictly after the
/// one before it.
fn ordered_thins(
    first: Option<HarvestPeriod>,
    second: Option<HarvestPeriod>,
    third: Option<HarvestPeriod>,
) -> Option<Vec<HarvestPeriod>> {
    let mut thins = Vec::with_capacity(3);
    let mut ended = false;
    for thin in [first, second, third] {
        match thin {
            Some(period) => {
                if ended || thins.last().is_some_and(|&last| period <= last) {
                    return None;
                }
                thins.push(period);
            }
            None => ended = true,
        }
    }
    Some(thins)
}

/// A random elite of the cell's pool to start from, if the position is
/// concrete and its pool has members.
fn chained_seed(
    position: &GridPosition,
    results: &Mutex<HeuristicResults>,
    rng: &mut Pseudorandom,
) -> Result<Option<Vec<HarvestPeriod>>> {
    if position.covers_all_rotations_and_rates() {
        return Ok(None);
    }
    let results = results
        .lock()
        .map_err(|_| SearchError::Other("Result grid lock poisoned".to_string()))?;
    let Some(pool) = results.cell(position).map(|cell| cell.pool()) else {
        return Ok(None);
    };
    if pool.is_empty() {
        return Ok(None);
    }
    let elite = pool.elite_solution(rng)?;
    Ok(Some(elite.selection.clone()))
}

/// Runs heuristic parameter sets across a grid of positions.
#[derive(Debug)]
pub struct GridDispatcher<T: StandTrajectory> {
    stand: T,
    parameters: Vec<HeuristicParameters>,
    options: OptimizeOptions,
    stop: StopHandle,
}

impl<T: StandTrajectory> GridDispatcher<T> {
    pub fn new(stand: T, parameters: Vec<HeuristicParameters>, options: OptimizeOptions) -> Self {
        Self {
            stand,
            parameters,
            options,
            stop: StopHandle::default(),
        }
    }

    pub fn options(&self) -> &OptimizeOptions {
        &self.options
    }

    pub fn parameters(&self) -> &[HeuristicParameters] {
        &self.parameters
    }

    /// A handle that stops this dispatcher's runs.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn shape(&self) -> GridShape {
        GridShape {
            discount_rates: self.options.get_discount_rates().len(),
            first_thin_periods: self.options.get_first_thin_periods().len(),
            second_thin_periods: self.options.get_second_thin_periods().len(),
            third_thin_periods: self.options.get_third_thin_periods().len(),
            rotation_lengths: self.options.get_rotation_lengths().len(),
            parameters: self.parameters.len(),
        }
    }

    /// Checks the options and every parameter set.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        self.options.validate()?;
        if self.parameters.is_empty() {
            return Err(SearchError::Configuration(
                "At least one heuristic parameter set is required".to_string(),
            ));
        }
        for (index, parameters) in self.parameters.iter().enumerate() {
            parameters.validate().map_err(|error| {
                error.at_position(format!("parameter index {} ({})", index, parameters.name()))
            })?;
        }
        if self.stand.tree_count() == 0 {
            return Err(SearchError::Configuration(
                "Stand must contain at least one tree".to_string(),
            ));
        }
        Ok(())
    }

    /// Every valid combination of the grid, parameter set outermost.
    ///
    /// Parameter sets whose strategy evaluates all rotations and discount
    /// rates get one combination per valid thin sequence, provided at least
    /// one rotation ends after the last thin.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options are invalid.
    pub fn enumerate_positions(&self) -> Result<Vec<DispatchCell>> {
        self.options.validate()?;
        let firsts = self.options.get_first_thin_periods();
        let seconds = self.options.get_second_thin_periods();
        let thirds = self.options.get_third_thin_periods();
        let rotations = self.options.get_rotation_lengths();
        let rates = self.options.get_discount_rates();
        let longest_rotation = rotations.iter().copied().max().unwrap_or(0);

        let mut cells = Vec::new();
        for (parameter_index, parameters) in self.parameters.iter().enumerate() {
            for first in 0..firsts.len() {
                for second in 0..seconds.len() {
                    for third in 0..thirds.len() {
                        let Some(thins) = ordered_thins(
                            thin_at(firsts, first),
                            thin_at(seconds, second),
                            thin_at(thirds, third),
                        ) else {
                            continue;
                        };
                        let last_thin = thins.last().copied().unwrap_or(0);
                        let position = GridPosition {
                            discount_rate_index: None,
                            first_thin_period_index: first,
                            second_thin_period_index: second,
                            third_thin_period_index: third,
                            rotation_index: None,
                            parameter_index,
                        };

                        if parameters.evaluates_all_rotations_and_rates() {
                            if longest_rotation > last_thin {
                                cells.push(DispatchCell {
                                    position,
                                    runtime_cost: runtime_cost(&thins, longest_rotation),
                                    thinning_periods: thins,
                                    rotation_length: None,
                                    discount_rate: None,
                                });
                            }
                            continue;
                        }

                        for (rotation_index, &rotation) in rotations.iter().enumerate() {
                            if rotation <= last_thin {
                                continue;
                            }
                            for (rate_index, &rate) in rates.iter().enumerate() {
                                cells.push(DispatchCell {
                                    position: position.at(rotation_index, rate_index),
                                    thinning_periods: thins.clone(),
                                    rotation_length: Some(rotation),
                                    discount_rate: Some(rate),
                                    runtime_cost: runtime_cost(&thins, rotation),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(cells)
    }

    fn run_parameters(&self, cell: &DispatchCell) -> RunParameters {
        let rotations = self.options.get_rotation_lengths();
        let rates = self.options.get_discount_rates();
        let mut run = match (cell.rotation_length, cell.discount_rate) {
            (Some(rotation), Some(rate)) => {
                RunParameters::new(cell.thinning_periods.clone(), rotation, rate)
            }
            _ => {
                let mut run = RunParameters::new(
                    cell.thinning_periods.clone(),
                    rotations.iter().copied().max().unwrap_or(0),
                    rates.first().copied().unwrap_or(0.0),
                );
                run.rotation_lengths = rotations.to_vec();
                run.discount_rates = rates.to_vec();
                run
            }
        };
        run.objective = self.options.get_objective();
        run.harvest_period_selection = self.options.get_harvest_period_selection();
        run
    }

    /// Executes one run and merges it into `results`.
    fn execute(
        &self,
        cell: &DispatchCell,
        best_of_index: usize,
        base_seed: u64,
        results: &Mutex<HeuristicResults>,
    ) -> Result<()> {
        let mut rng = Pseudorandom::for_run(base_seed, cell.position.seed_key(), best_of_index);

        let seed = if self.options.get_chain_from_pool() {
            chained_seed(&cell.position, results, &mut rng)?
        } else {
            None
        };

        let parameters = &self.parameters[cell.position.parameter_index];
        let run = self.run_parameters(cell);
        let mut heuristic = parameters
            .build(&self.stand, rng)
            .map_err(|error| error.at_position(cell.context()))?;
        let counters = heuristic
            .run(&run, seed.as_deref())
            .map_err(|error| error.at_position(cell.context()))?;

        let mut results = results
            .lock()
            .map_err(|_| SearchError::Other("Result grid lock poisoned".to_string()))?;
        let moves = heuristic.moves().accepted_objectives();
        if cell.position.covers_all_rotations_and_rates() {
            let filled = results.scatter(
                &cell.position,
                |rotation_index, rate_index| heuristic.best_for(rotation_index, rate_index),
                moves,
                &counters,
            );
            if self.options.get_log_level() == LogLevel::Verbose {
                debug!(event = "run_scattered", position = %cell.position, sub_cells = filled);
            }
        } else {
            results
                .assimilate(&cell.position, &heuristic.core().best_solution(), moves, &counters)
                .map_err(|error| error.at_position(cell.context()))?;
        }
        Ok(())
    }

    /// Runs the whole grid and returns the finalized result grid.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any run starts if the options or
    /// parameters are invalid, `SearchError::WorkerPool` if the thread pool
    /// cannot be built, and the first failing run's error wrapped in
    /// `SearchError::Run` with its grid coordinates.
    pub fn run(&self) -> Result<HeuristicResults> {
        self.validate()?;
        let cells = self.enumerate_positions()?;
        let mut results = HeuristicResults::new(self.shape(), self.options.get_solution_pool_size())?;
        let rotations = self.options.get_rotation_lengths();
        for cell in &cells {
            results.add_position(cell.position)?;
            if cell.position.covers_all_rotations_and_rates() {
                let last_thin = cell.thinning_periods.last().copied().unwrap_or(0);
                for (rotation_index, &rotation) in rotations.iter().enumerate() {
                    if rotation <= last_thin {
                        continue;
                    }
                    for rate_index in 0..self.options.get_discount_rates().len() {
                        results.add_cell(cell.position.at(rotation_index, rate_index))?;
                    }
                }
            }
        }

        let log_level = self.options.get_log_level();
        if cells.is_empty() {
            if log_level != LogLevel::None {
                warn!(event = "dispatch_empty", "No valid grid positions to run");
            }
            return Ok(results);
        }

        let best_of = self.options.get_best_of();
        let runs: Vec<(usize, usize)> = (0..cells.len())
            .flat_map(|cell| (0..best_of).map(move |best_of_index| (cell, best_of_index)))
            .collect();
        let total_cost: usize = cells.iter().map(|cell| cell.runtime_cost.max(1)).sum::<usize>() * best_of;
        let base_seed = self.options.get_base_seed().unwrap_or_else(rand::random);
        let workers = WorkerPool::with_workers(self.options.get_threads());

        if log_level != LogLevel::None {
            info!(
                event = "dispatch_start",
                positions = cells.len(),
                runs = runs.len(),
                threads = self.options.get_threads(),
                base_seed,
            );
        }

        let start = Instant::now();
        let results = Mutex::new(results);
        let completed_cost = AtomicUsize::new(0);
        let runs_skipped = AtomicUsize::new(0);
        let outcome = thread::scope(|scope| {
            let work = scope.spawn(|| {
                workers.install(|| {
                    runs.par_iter()
                        .try_for_each(|&(cell_index, best_of_index)| {
                            if self.stop.is_stopped() {
                                runs_skipped.fetch_add(1, Ordering::Relaxed);
                                return Ok(());
                            }
                            let cell = &cells[cell_index];
                            self.execute(cell, best_of_index, base_seed, &results)?;
                            completed_cost.fetch_add(cell.runtime_cost.max(1), Ordering::Relaxed);
                            Ok(())
                        })
                })
            });

            let interval = self.options.get_progress_interval();
            let mut last_report = Instant::now();
            while !work.is_finished() {
                thread::sleep(interval.min(COMPLETION_POLL));
                if log_level != LogLevel::None && last_report.elapsed() >= interval {
                    let fraction = completed_cost.load(Ordering::Relaxed) as f64 / total_cost as f64;
                    let elapsed = start.elapsed().as_secs_f64();
                    let remaining = if fraction > 0.0 {
                        elapsed * (1.0 / fraction - 1.0)
                    } else {
                        f64::NAN
                    };
                    info!(
                        event = "dispatch_progress",
                        percent_complete = (100.0 * fraction) as u32,
                        elapsed_s = elapsed,
                        remaining_s = remaining,
                    );
                    last_report = Instant::now();
                }
            }
            work.join()
        });
        outcome
            .map_err(|_| SearchError::Other("Dispatch worker panicked".to_string()))?
            .and_then(|dispatched| dispatched)?;

        let mut results = results
            .into_inner()
            .map_err(|_| SearchError::Other("Result grid lock poisoned".to_string()))?;
        results.on_runs_complete();

        let elapsed = start.elapsed();
        let skipped = runs_skipped.load(Ordering::Relaxed);
        if log_level != LogLevel::None {
            if skipped > 0 {
                warn!(event = "dispatch_stopped", runs_skipped = skipped);
            }
            let totals = results.total_counters();
            info!(
                event = "dispatch_end",
                cells = results.len(),
                runs = results.runs_completed(),
                moves = totals.moves(),
                timesteps = totals.growth_model_timesteps,
                core_ms = totals.duration.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
            );
        }
        Ok(results)
    }
}
