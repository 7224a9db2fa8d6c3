//! # Heuristics
//!
//! Every search strategy shares the same shape. It is built from its
//! parameters and a template stand, and owns its own pseudorandom stream.
//! `run()` constructs a starting selection (copied from a seed or
//! randomized), then searches, keeping three trajectories:
//!
//! - `current`, the accepted state,
//! - `candidate`, a scratch copy a move is tried on and reverted from,
//! - `best`, the best state seen so far.
//!
//! Each run appends to a [`MoveLog`]: the accepted objective after every move,
//! the candidate objective the move was judged on, and the tree it touched.
//!
//! The closed set of strategies is [`SearchStrategy`], built from the
//! matching [`HeuristicParameters`] variant.

use std::time::Instant;

use tracing::debug;

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::pool::EliteSolution;
use crate::rng::Pseudorandom;
use crate::trajectory::{HarvestPeriod, StandTrajectory, NO_HARVEST};

pub mod deluge;
pub mod genetic;
mod parameters;
pub mod prescription;
pub mod tabu;
pub mod threshold;

pub use parameters::{HeuristicParameters, SearchStrategy};

/// Which value of a simulated trajectory is maximized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimberObjective {
    /// Discounted financial value at the run's rotation and discount rate.
    #[default]
    LandExpectationValue,
    /// Total merchantable volume harvested over the rotation.
    Volume,
}

/// Which periods a move may send a tree to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HarvestPeriodSelection {
    /// Only the extremes: retain the tree, or remove it in the last thin.
    #[default]
    NoneOrLast,
    /// Any configured thin.
    All,
}

/// The grid position a run evaluates, resolved to concrete periods and rates.
///
/// `rotation_lengths` and `discount_rates` list every rotation and rate of the
/// grid. Single-position runs only use `rotation_length` and `discount_rate`;
/// strategies that evaluate all rotations and rates at once use the lists.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    pub thinning_periods: Vec<HarvestPeriod>,
    pub rotation_length: HarvestPeriod,
    pub discount_rate: f64,
    pub rotation_lengths: Vec<HarvestPeriod>,
    pub discount_rates: Vec<f64>,
    pub objective: TimberObjective,
    pub harvest_period_selection: HarvestPeriodSelection,
}

impl RunParameters {
    pub fn new(
        thinning_periods: Vec<HarvestPeriod>,
        rotation_length: HarvestPeriod,
        discount_rate: f64,
    ) -> Self {
        Self {
            thinning_periods,
            rotation_length,
            discount_rate,
            rotation_lengths: vec![rotation_length],
            discount_rates: vec![discount_rate],
            objective: TimberObjective::default(),
            harvest_period_selection: HarvestPeriodSelection::default(),
        }
    }

    pub fn with_objective(mut self, objective: TimberObjective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_harvest_period_selection(mut self, selection: HarvestPeriodSelection) -> Self {
        self.harvest_period_selection = selection;
        self
    }

    /// Objective of `trajectory` at an arbitrary rotation and rate.
    pub fn value_at<T: StandTrajectory>(
        &self,
        trajectory: &T,
        rotation_length: HarvestPeriod,
        discount_rate: f64,
    ) -> f64 {
        match self.objective {
            TimberObjective::LandExpectationValue => {
                trajectory.financial_value(rotation_length, discount_rate)
            }
            TimberObjective::Volume => trajectory.harvested_volume(rotation_length),
        }
    }

    /// Objective of `trajectory` at this run's rotation and rate.
    pub fn objective_value<T: StandTrajectory>(&self, trajectory: &T) -> f64 {
        self.value_at(trajectory, self.rotation_length, self.discount_rate)
    }
}

/// Per-move record of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveLog {
    accepted: Vec<f64>,
    candidate: Vec<f64>,
    tree: Vec<Option<usize>>,
}

impl MoveLog {
    pub fn push(&mut self, accepted_objective: f64, candidate_objective: f64, tree: Option<usize>) {
        self.accepted.push(accepted_objective);
        self.candidate.push(candidate_objective);
        self.tree.push(tree);
    }

    /// Objective of the accepted state after each move.
    pub fn accepted_objectives(&self) -> &[f64] {
        &self.accepted
    }

    pub fn candidate_objectives(&self) -> &[f64] {
        &self.candidate
    }

    pub fn trees(&self) -> &[Option<usize>] {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn clear(&mut self) {
        self.accepted.clear();
        self.candidate.clear();
        self.tree.clear();
    }
}

/// State shared by every strategy.
#[derive(Debug, Clone)]
pub struct HeuristicCore<T: StandTrajectory> {
    pub current: T,
    pub candidate: T,
    pub best: T,
    pub current_objective: f64,
    pub best_objective: f64,
    pub moves: MoveLog,
    pub rng: Pseudorandom,
    pub run: RunParameters,
}

impl<T: StandTrajectory> HeuristicCore<T> {
    pub fn new(stand: &T, rng: Pseudorandom) -> Self {
        Self {
            current: stand.clone(),
            candidate: stand.clone(),
            best: stand.clone(),
            current_objective: f64::NEG_INFINITY,
            best_objective: f64::NEG_INFINITY,
            moves: MoveLog::default(),
            rng,
            run: RunParameters::new(Vec::new(), 0, 0.0),
        }
    }

    /// Configures the trajectories for `run` and clears the previous run.
    pub fn prepare(&mut self, run: &RunParameters) {
        self.current.set_thinning_periods(&run.thinning_periods);
        self.candidate.copy_from(&self.current);
        self.best.copy_from(&self.current);
        self.run = run.clone();
        self.moves.clear();
        self.current_objective = f64::NEG_INFINITY;
        self.best_objective = f64::NEG_INFINITY;
    }

    pub fn objective(&self, trajectory: &T) -> f64 {
        self.run.objective_value(trajectory)
    }

    /// Builds the starting selection.
    ///
    /// With a seed, every tree takes the seed's period if that period is a
    /// configured thin and is retained otherwise. Without one, each tree is
    /// thinned with `initial_thinning_probability` in a uniformly chosen thin.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the probability lies outside `[0, 1]`
    /// or the seed does not cover every tree.
    pub fn construct(
        &mut self,
        seed: Option<&[HarvestPeriod]>,
        initial_thinning_probability: f64,
    ) -> Result<PerformanceCounters> {
        validate_probability("Initial thinning probability", initial_thinning_probability)?;
        let tree_count = self.current.tree_count();
        let thins: Vec<HarvestPeriod> = self.current.valid_harvest_periods()[1..].to_vec();
        let mut counters = PerformanceCounters::new();

        match seed {
            Some(seed) => {
                if seed.len() != tree_count {
                    return Err(SearchError::Configuration(format!(
                        "Seed selection covers {} trees but the stand has {}",
                        seed.len(),
                        tree_count
                    )));
                }
                for (tree, &period) in seed.iter().enumerate() {
                    let period = if thins.contains(&period) { period } else { NO_HARVEST };
                    self.current.set_tree_selection(tree, period);
                }
            }
            None => {
                for tree in 0..tree_count {
                    let period = if !thins.is_empty() && self.rng.chance(initial_thinning_probability)
                    {
                        counters.trees_randomized_in_construction += 1;
                        thins[self.rng.index(thins.len())]
                    } else {
                        NO_HARVEST
                    };
                    self.current.set_tree_selection(tree, period);
                }
            }
        }

        counters.growth_model_timesteps += self.current.simulate();
        self.candidate.copy_from(&self.current);
        self.best.copy_from(&self.current);
        self.current_objective = self.objective(&self.current);
        self.best_objective = self.current_objective;
        Ok(counters)
    }

    /// Copies `current` into `best` if `objective` beats the best so far.
    pub fn update_best(&mut self, objective: f64) -> bool {
        if objective > self.best_objective {
            self.best.copy_from(&self.current);
            self.best_objective = objective;
            true
        } else {
            false
        }
    }

    /// Moves one random tree of the candidate to a different valid period and
    /// keeps or reverts the change according to `accept`.
    ///
    /// Returns the tree, the candidate objective and whether the move was
    /// accepted, or `None` if no tree has an alternative period.
    pub fn try_one_opt_move<F>(
        &mut self,
        accept: F,
        counters: &mut PerformanceCounters,
    ) -> Option<(usize, f64, bool)>
    where
        F: FnOnce(f64) -> bool,
    {
        let periods = self.candidate.valid_harvest_periods();
        let period_count = periods.len();
        let tree_count = self.candidate.tree_count();
        if period_count < 2 || tree_count == 0 {
            return None;
        }

        let tree = self.rng.tree_index(tree_count);
        let current_period = self.candidate.tree_selection(tree);
        let alternatives: Vec<HarvestPeriod> = periods
            .iter()
            .copied()
            .filter(|&p| p != current_period)
            .collect();
        let period = alternatives[self.rng.index(alternatives.len())];

        self.candidate.set_tree_selection(tree, period);
        counters.growth_model_timesteps += self.candidate.simulate();
        let candidate_objective = self.objective(&self.candidate);
        let accepted = accept(candidate_objective);
        if accepted {
            self.current.copy_from(&self.candidate);
            self.current_objective = candidate_objective;
            counters.moves_accepted += 1;
            self.update_best(candidate_objective);
        } else {
            self.candidate.set_tree_selection(tree, current_period);
            counters.moves_rejected += 1;
        }
        Some((tree, candidate_objective, accepted))
    }

    /// The best selection and its objective.
    pub fn best_solution(&self) -> EliteSolution {
        EliteSolution {
            selection: self.best.selection().to_vec(),
            value: self.best_objective,
        }
    }
}

/// The contract every search strategy implements.
pub trait Heuristic<T: StandTrajectory>: Send {
    fn name(&self) -> &'static str;

    fn core(&self) -> &HeuristicCore<T>;

    fn core_mut(&mut self) -> &mut HeuristicCore<T>;

    /// Probability with which random construction thins each tree.
    fn initial_thinning_probability(&self) -> f64;

    /// Rejects positions the strategy's move generation cannot handle.
    fn check_supported(&self, _run: &RunParameters) -> Result<()> {
        Ok(())
    }

    /// Prepares the trajectories for `run` and builds the starting selection.
    fn construct(
        &mut self,
        run: &RunParameters,
        seed: Option<&[HarvestPeriod]>,
    ) -> Result<PerformanceCounters> {
        self.check_supported(run)?;
        let probability = self.initial_thinning_probability();
        let core = self.core_mut();
        core.prepare(run);
        core.construct(seed, probability)
    }

    /// Searches from the constructed selection, adding to `counters`.
    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()>;

    /// Runs the strategy at one grid position.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::NotSupported` if the position is structurally
    /// incompatible with the strategy and a configuration error if the seed
    /// or construction parameters are invalid.
    fn run(
        &mut self,
        run: &RunParameters,
        seed: Option<&[HarvestPeriod]>,
    ) -> Result<PerformanceCounters> {
        let start = Instant::now();
        let mut counters = self.construct(run, seed)?;
        debug!(
            event = "run_start",
            heuristic = self.name(),
            thins = ?run.thinning_periods,
            rotation_length = run.rotation_length,
            discount_rate = run.discount_rate,
            initial_objective = self.best_objective(),
            trees_randomized = counters.trees_randomized_in_construction,
        );
        self.search(&mut counters)?;
        counters.duration = start.elapsed();
        debug!(
            event = "run_end",
            heuristic = self.name(),
            best_objective = self.best_objective(),
            moves = self.moves().len(),
            moves_accepted = counters.moves_accepted,
            timesteps = counters.growth_model_timesteps,
            duration_ms = counters.duration.as_millis() as u64,
        );
        Ok(counters)
    }

    fn objective(&self, trajectory: &T) -> f64 {
        self.core().objective(trajectory)
    }

    fn best_objective(&self) -> f64 {
        self.core().best_objective
    }

    fn best_trajectory(&self) -> &T {
        &self.core().best
    }

    fn current_trajectory(&self) -> &T {
        &self.core().current
    }

    fn moves<'a>(&'a self) -> &'a MoveLog
    where
        T: 'a,
    {
        &self.core().moves
    }

    /// Whether one run fills every (rotation, discount rate) pair at once.
    fn evaluates_all_rotations_and_rates(&self) -> bool {
        false
    }

    /// Best solution for one rotation and rate of a run that evaluates all
    /// of them. Indices refer to `RunParameters::rotation_lengths` and
    /// `RunParameters::discount_rates`.
    fn best_for(&self, _rotation_index: usize, _discount_rate_index: usize) -> Option<EliteSolution> {
        None
    }
}

pub(crate) fn validate_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SearchError::Configuration(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TabularTrajectory;

    fn core() -> HeuristicCore<TabularTrajectory> {
        let stand = TabularTrajectory::synthetic(30, 8, 4);
        let mut core = HeuristicCore::new(&stand, Pseudorandom::from_seed(8));
        core.prepare(&RunParameters::new(vec![2, 4], 8, 0.04));
        core
    }

    #[test]
    fn test_construct_rejects_out_of_range_probability() {
        let mut core = core();
        assert!(matches!(
            core.construct(None, 1.5),
            Err(SearchError::Configuration(_))
        ));
        assert!(matches!(
            core.construct(None, -0.1),
            Err(SearchError::Configuration(_))
        ));
    }

    #[test]
    fn test_construct_randomizes_into_configured_thins() {
        let mut core = core();
        let counters = core.construct(None, 0.5).unwrap();
        let thinned = core
            .current
            .selection()
            .iter()
            .filter(|&&p| p != NO_HARVEST)
            .count();
        assert_eq!(thinned, counters.trees_randomized_in_construction);
        assert!(core
            .current
            .selection()
            .iter()
            .all(|p| [NO_HARVEST, 2, 4].contains(p)));
        assert_eq!(core.best_objective, core.objective(&core.current));
        assert_eq!(core.candidate.selection(), core.current.selection());
    }

    #[test]
    fn test_construct_copies_seed_and_drops_unknown_periods() {
        let mut core = core();
        let mut seed = vec![NO_HARVEST; 30];
        seed[0] = 2;
        seed[1] = 4;
        seed[2] = 3;
        let counters = core.construct(Some(&seed), 0.5).unwrap();
        assert_eq!(counters.trees_randomized_in_construction, 0);
        assert_eq!(core.current.tree_selection(0), 2);
        assert_eq!(core.current.tree_selection(1), 4);
        assert_eq!(core.current.tree_selection(2), NO_HARVEST);

        assert!(matches!(
            core.construct(Some(&seed[..5]), 0.5),
            Err(SearchError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejected_one_opt_move_restores_candidate() {
        let mut core = core();
        core.construct(None, 0.3).unwrap();
        let before = core.current.selection().to_vec();
        let mut counters = PerformanceCounters::new();
        for _ in 0..50 {
            let (_, _, accepted) = core.try_one_opt_move(|_| false, &mut counters).unwrap();
            assert!(!accepted);
            assert_eq!(core.current.selection(), before.as_slice());
            assert_eq!(core.candidate.selection(), before.as_slice());
        }
        assert_eq!(counters.moves_rejected, 50);
    }

    #[test]
    fn test_accepted_one_opt_move_changes_exactly_one_tree() {
        let mut core = core();
        core.construct(None, 0.3).unwrap();
        let before = core.current.selection().to_vec();
        let mut counters = PerformanceCounters::new();
        let (tree, objective, accepted) = core.try_one_opt_move(|_| true, &mut counters).unwrap();
        assert!(accepted);
        assert_eq!(core.current_objective, objective);
        let changed: Vec<usize> = (0..before.len())
            .filter(|&t| before[t] != core.current.tree_selection(t))
            .collect();
        assert_eq!(changed, vec![tree]);
    }

    #[test]
    fn test_no_move_without_thins() {
        let stand = TabularTrajectory::synthetic(5, 4, 4);
        let mut core = HeuristicCore::new(&stand, Pseudorandom::from_seed(8));
        core.prepare(&RunParameters::new(Vec::new(), 4, 0.04));
        core.construct(None, 1.0).unwrap();
        let mut counters = PerformanceCounters::new();
        assert!(core.try_one_opt_move(|_| true, &mut counters).is_none());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_run_emits_start_and_end_events() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let stand = TabularTrajectory::synthetic(12, 8, 4);
        let mut search = threshold::ThresholdAccepting::new(
            &stand,
            threshold::ThresholdParameters::default().with_stages(&[(1.0, 20)]),
            Pseudorandom::from_seed(3),
        )
        .unwrap();
        tracing::subscriber::with_default(subscriber, || {
            search
                .run(&RunParameters::new(vec![3], 8, 0.04), None)
                .unwrap();
        });

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        let start = output.find("run_start").expect("run_start event");
        let end = output.find("run_end").expect("run_end event");
        assert!(start < end);
        assert!(output.contains("thins=[3]"));
    }
}
