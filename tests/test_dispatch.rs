use harvest_search::{
    dispatch::{GridDispatcher, LogLevel, OptimizeOptions},
    error::{Result, SearchError},
    heuristic::{
        deluge::GreatDelugeParameters, genetic::GeneticParameters,
        prescription::PrescriptionParameters, tabu::TabuParameters,
        threshold::ThresholdParameters, HeuristicParameters,
    },
    trajectory::{
        HarvestPeriod, StandTrajectory, TabularTrajectory, ThinningPrescription, NO_HARVEST,
    },
};

/// A stand worth one unit per thinned tree, so every thin is an improvement.
#[derive(Clone, Debug)]
struct CountingStand {
    selection: Vec<HarvestPeriod>,
    valid_periods: Vec<HarvestPeriod>,
    stale: bool,
}

impl CountingStand {
    fn new(tree_count: usize) -> Self {
        Self {
            selection: vec![NO_HARVEST; tree_count],
            valid_periods: vec![NO_HARVEST],
            stale: true,
        }
    }

    fn thinned(&self) -> f64 {
        self.selection.iter().filter(|&&p| p != NO_HARVEST).count() as f64
    }
}

impl StandTrajectory for CountingStand {
    fn tree_count(&self) -> usize {
        self.selection.len()
    }

    fn set_thinning_periods(&mut self, thinning_periods: &[HarvestPeriod]) {
        let mut valid = vec![NO_HARVEST];
        valid.extend_from_slice(thinning_periods);
        valid.sort_unstable();
        valid.dedup();
        self.valid_periods = valid;
        self.stale = true;
    }

    fn valid_harvest_periods(&self) -> &[HarvestPeriod] {
        &self.valid_periods
    }

    fn selection(&self) -> &[HarvestPeriod] {
        &self.selection
    }

    fn set_tree_selection(&mut self, tree: usize, period: HarvestPeriod) {
        self.selection[tree] = period;
        self.stale = true;
    }

    fn copy_from(&mut self, other: &Self) {
        self.selection.clone_from(&other.selection);
        self.valid_periods.clone_from(&other.valid_periods);
        self.stale = other.stale;
    }

    fn simulate(&mut self) -> usize {
        let timesteps = usize::from(self.stale);
        self.stale = false;
        timesteps
    }

    fn financial_value(&self, _rotation_length: HarvestPeriod, _discount_rate: f64) -> f64 {
        self.thinned()
    }

    fn harvested_volume(&self, _rotation_length: HarvestPeriod) -> f64 {
        self.thinned()
    }

    fn tree_dbh(&self, tree: usize) -> f32 {
        10.0 + tree as f32
    }

    fn tree_height(&self, tree: usize) -> f32 {
        50.0 + tree as f32
    }

    fn thin_by_prescription(
        &mut self,
        _period: HarvestPeriod,
        _prescription: &ThinningPrescription,
    ) -> Result<f64> {
        Err(SearchError::NotSupported(
            "Counting stands do not thin by prescription".to_string(),
        ))
    }
}

fn quiet() -> OptimizeOptions {
    OptimizeOptions::builder()
        .base_seed(2024)
        .log_level(LogLevel::None)
        .build()
}

#[test]
fn test_single_cell_converges_to_optimum() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut options = quiet();
    options.set_first_thin_periods(vec![Some(3)]);
    options.set_rotation_lengths(vec![6]);
    options.set_log_level(LogLevel::Verbose);
    let parameters = vec![HeuristicParameters::ThresholdAccepting(
        ThresholdParameters::default()
            .with_stages(&[(1.0, 200)])
            .with_initial_thinning_probability(0.0),
    )];

    let results = GridDispatcher::new(CountingStand::new(10), parameters, options)
        .run()
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results.runs_completed(), 1);

    let (_, cell) = results.cells().next().unwrap();
    let series = cell.distribution().mean_by_move();
    assert_eq!(series.len(), 200);
    assert!(series.windows(2).all(|w| w[1] >= w[0]));
    assert_eq!(*series.last().unwrap(), 10.0);
    assert_eq!(cell.pool().high().unwrap().value, 10.0);
    assert!(cell.pool().high().unwrap().selection.iter().all(|&p| p == 3));
}

#[test]
fn test_second_thin_equal_to_first_generates_no_cells() {
    let mut options = quiet();
    options.set_first_thin_periods(vec![Some(3)]);
    options.set_second_thin_periods(vec![Some(3)]);
    let parameters = vec![HeuristicParameters::Tabu(TabuParameters::default())];
    let dispatcher = GridDispatcher::new(CountingStand::new(10), parameters, options);

    assert!(dispatcher.enumerate_positions().unwrap().is_empty());
    let results = dispatcher.run().unwrap();
    assert!(results.is_empty());
    assert_eq!(results.runs_completed(), 0);
}

#[test]
fn test_failing_run_aborts_with_grid_coordinates() {
    let mut options = quiet();
    options.set_first_thin_periods(vec![Some(2)]);
    options.set_second_thin_periods(vec![Some(4)]);
    options.set_third_thin_periods(vec![Some(6)]);
    options.set_rotation_lengths(vec![10]);
    options.set_discount_rates(vec![0.05]);
    options.set_best_of(3);
    let parameters = vec![HeuristicParameters::ThresholdAccepting(
        ThresholdParameters::default(),
    )];

    let error = GridDispatcher::new(CountingStand::new(10), parameters, options)
        .run()
        .unwrap_err();
    match error {
        SearchError::Run { context, source } => {
            assert!(context.contains("parameter index 0"));
            assert!(context.contains("thins [2, 4, 6]"));
            assert!(context.contains("rotation length 10"));
            assert!(context.contains("discount rate 0.05"));
            assert!(matches!(*source, SearchError::NotSupported(_)));
        }
        other => panic!("expected a run error, got {:?}", other),
    }
}

#[test]
fn test_vectorized_failure_names_marker() {
    let mut options = quiet();
    options.set_first_thin_periods(vec![Some(3)]);
    let parameters = vec![HeuristicParameters::Prescription(
        PrescriptionParameters::default(),
    )];

    let error = GridDispatcher::new(CountingStand::new(10), parameters, options)
        .run()
        .unwrap_err();
    let message = error.to_string();
    assert!(message.contains("rotation length vectorized"));
    assert!(message.contains("Not supported"));
}

#[test]
fn test_every_strategy_fills_its_cells() {
    let stand = TabularTrajectory::synthetic(24, 12, 9);
    let options = OptimizeOptions::builder()
        .best_of(2)
        .first_thin_periods(vec![None, Some(3)])
        .second_thin_periods(vec![None, Some(6)])
        .rotation_lengths(vec![8, 12])
        .discount_rates(vec![0.04, 0.06])
        .solution_pool_size(3)
        .threads(2)
        .base_seed(77)
        .chain_from_pool(true)
        .log_level(LogLevel::None)
        .build();
    let parameters = vec![
        HeuristicParameters::Tabu(TabuParameters::default().with_iterations(5)),
        HeuristicParameters::ThresholdAccepting(
            ThresholdParameters::default().with_stages(&[(1.0, 60), (0.995, 20)]),
        ),
        HeuristicParameters::GreatDeluge(GreatDelugeParameters::default().with_iterations(60)),
        HeuristicParameters::Genetic(
            GeneticParameters::default()
                .with_population_size(8)
                .with_maximum_generations(4),
        ),
        HeuristicParameters::Prescription(
            PrescriptionParameters::default().with_intensity(0.0, 30.0, 15.0),
        ),
    ];
    let dispatcher = GridDispatcher::new(stand, parameters, options);
    let cells = dispatcher.enumerate_positions().unwrap();
    let results = dispatcher.run().unwrap();

    // Thin sequences [], [3], [3, 6]; all rotations are after the last thin.
    // Four single-position strategies fill 3 x 2 x 2 cells each, and the
    // prescription strategy scatters into the same 12 cells from 3 runs.
    assert_eq!(cells.len(), 4 * 12 + 3);
    assert_eq!(results.len(), 5 * 12);
    assert_eq!(results.runs_completed(), 2 * cells.len());

    for (position, cell) in results.cells() {
        assert_eq!(cell.distribution().total_runs(), 2, "{}", position);
        assert!(cell.distribution().is_finalized());
        let pool = cell.pool();
        assert!(!pool.is_empty() && pool.len() <= 3);
        let high = pool.high().unwrap().value;
        assert!(pool.solutions().iter().all(|s| s.value <= high));
    }
    let attributed: usize = results.cells().map(|(_, cell)| cell.counters().moves()).sum();
    assert_eq!(attributed, results.total_counters().moves());
    assert!(results.best_cell().is_some());
}
