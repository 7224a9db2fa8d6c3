//! # Distribution
//!
//! Statistics of the move series of every run at one grid position. Runs are
//! added one at a time; summary fields are computed once by
//! [`HeuristicDistribution::on_runs_complete`].

use std::time::Duration;

/// Quartiles need more than this many samples.
const QUARTILE_MINIMUM_SAMPLES: usize = 4;
/// The 5th and 95th percentiles need more than this many samples.
const PERCENTILE_MINIMUM_SAMPLES: usize = 19;

#[derive(Debug, Clone, Default)]
pub struct HeuristicDistribution {
    count_by_move: Vec<usize>,
    sum_by_move: Vec<f64>,
    sum_of_squares_by_move: Vec<f64>,
    minimum_by_move: Vec<f64>,
    maximum_by_move: Vec<f64>,
    values_by_move: Vec<Vec<f64>>,

    mean_by_move: Vec<f64>,
    variance_by_move: Vec<f64>,
    median_by_move: Vec<f64>,
    lower_quartile_by_move: Vec<Option<f64>>,
    upper_quartile_by_move: Vec<Option<f64>>,
    fifth_percentile_by_move: Vec<Option<f64>>,
    ninety_fifth_percentile_by_move: Vec<Option<f64>>,
    finalized: bool,

    best_objective_by_run: Vec<f64>,
    runtime_by_run: Vec<Duration>,
    total_core_time: Duration,
    total_moves: usize,
    total_runs: usize,
}

impl HeuristicDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one run's move series.
    pub fn add_run(&mut self, objectives_by_move: &[f64], best_objective: f64, runtime: Duration) {
        for (index, &objective) in objectives_by_move.iter().enumerate() {
            if index >= self.count_by_move.len() {
                self.count_by_move.push(1);
                self.sum_by_move.push(objective);
                self.sum_of_squares_by_move.push(objective * objective);
                self.minimum_by_move.push(objective);
                self.maximum_by_move.push(objective);
                self.values_by_move.push(vec![objective]);
            } else {
                self.count_by_move[index] += 1;
                self.sum_by_move[index] += objective;
                self.sum_of_squares_by_move[index] += objective * objective;
                self.minimum_by_move[index] = self.minimum_by_move[index].min(objective);
                self.maximum_by_move[index] = self.maximum_by_move[index].max(objective);
                self.values_by_move[index].push(objective);
            }
        }

        self.best_objective_by_run.push(best_objective);
        self.runtime_by_run.push(runtime);
        self.total_core_time += runtime;
        self.total_moves += objectives_by_move.len();
        self.total_runs += 1;
    }

    /// Computes means, variances and quantiles for every move index.
    ///
    /// Calling this again after more runs were added recomputes everything.
    pub fn on_runs_complete(&mut self) {
        let moves = self.count_by_move.len();
        self.mean_by_move = Vec::with_capacity(moves);
        self.variance_by_move = Vec::with_capacity(moves);
        self.median_by_move = Vec::with_capacity(moves);
        self.lower_quartile_by_move = Vec::with_capacity(moves);
        self.upper_quartile_by_move = Vec::with_capacity(moves);
        self.fifth_percentile_by_move = Vec::with_capacity(moves);
        self.ninety_fifth_percentile_by_move = Vec::with_capacity(moves);

        for index in 0..moves {
            let count = self.count_by_move[index] as f64;
            let mean = self.sum_by_move[index] / count;
            self.mean_by_move.push(mean);
            self.variance_by_move
                .push((self.sum_of_squares_by_move[index] / count - mean * mean).max(0.0));

            let values = &mut self.values_by_move[index];
            values.sort_by(f64::total_cmp);
            let n = values.len();
            let median = if n % 2 == 1 {
                values[n / 2]
            } else {
                0.5 * values[n / 2 - 1] + 0.5 * values[n / 2]
            };
            self.median_by_move.push(median);

            let (lower, upper) = if n > QUARTILE_MINIMUM_SAMPLES {
                (Some(quantile(values, 1, 4)), Some(quantile(values, 3, 4)))
            } else {
                (None, None)
            };
            self.lower_quartile_by_move.push(lower);
            self.upper_quartile_by_move.push(upper);

            let (fifth, ninety_fifth) = if n > PERCENTILE_MINIMUM_SAMPLES {
                (Some(quantile(values, 1, 20)), Some(quantile(values, 19, 20)))
            } else {
                (None, None)
            };
            self.fifth_percentile_by_move.push(fifth);
            self.ninety_fifth_percentile_by_move.push(ninety_fifth);
        }
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn count_by_move(&self) -> &[usize] {
        &self.count_by_move
    }

    pub fn minimum_by_move(&self) -> &[f64] {
        &self.minimum_by_move
    }

    pub fn maximum_by_move(&self) -> &[f64] {
        &self.maximum_by_move
    }

    /// Observed values per move, sorted once finalized.
    pub fn values_by_move(&self) -> &[Vec<f64>] {
        &self.values_by_move
    }

    pub fn mean_by_move(&self) -> &[f64] {
        &self.mean_by_move
    }

    /// Population variance per move.
    pub fn variance_by_move(&self) -> &[f64] {
        &self.variance_by_move
    }

    pub fn median_by_move(&self) -> &[f64] {
        &self.median_by_move
    }

    pub fn lower_quartile_by_move(&self) -> &[Option<f64>] {
        &self.lower_quartile_by_move
    }

    pub fn upper_quartile_by_move(&self) -> &[Option<f64>] {
        &self.upper_quartile_by_move
    }

    pub fn fifth_percentile_by_move(&self) -> &[Option<f64>] {
        &self.fifth_percentile_by_move
    }

    pub fn ninety_fifth_percentile_by_move(&self) -> &[Option<f64>] {
        &self.ninety_fifth_percentile_by_move
    }

    pub fn best_objective_by_run(&self) -> &[f64] {
        &self.best_objective_by_run
    }

    pub fn runtime_by_run(&self) -> &[Duration] {
        &self.runtime_by_run
    }

    /// Sum of run durations, which exceeds wall clock time when runs overlap.
    pub fn total_core_time(&self) -> Duration {
        self.total_core_time
    }

    pub fn total_moves(&self) -> usize {
        self.total_moves
    }

    pub fn total_runs(&self) -> usize {
        self.total_runs
    }

    /// Best objective over all runs.
    pub fn best_objective(&self) -> Option<f64> {
        self.best_objective_by_run.iter().copied().reduce(f64::max)
    }

    /// Mean of the runs' best objectives.
    pub fn mean_best_objective(&self) -> Option<f64> {
        if self.best_objective_by_run.is_empty() {
            return None;
        }
        Some(self.best_objective_by_run.iter().sum::<f64>() / self.best_objective_by_run.len() as f64)
    }
}

/// The `numerator / denominator` quantile of sorted values. Sample counts
/// divisible by `denominator` index directly; others interpolate between the
/// floor and ceiling ranks.
fn quantile(sorted: &[f64], numerator: usize, denominator: usize) -> f64 {
    let n = sorted.len();
    if n % denominator == 0 {
        return sorted[numerator * n / denominator];
    }
    let position = numerator as f64 * n as f64 / denominator as f64;
    let floor = position.floor();
    let ceiling = position.ceil();
    let floor_weight = 1.0 - position + floor;
    let ceiling_weight = 1.0 + position - ceiling;
    floor_weight * sorted[floor as usize] + ceiling_weight * sorted[(ceiling as usize).min(n - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Pseudorandom;

    fn distribution_of(samples: &[f64]) -> HeuristicDistribution {
        let mut distribution = HeuristicDistribution::new();
        for &sample in samples {
            distribution.add_run(&[sample], sample, Duration::from_millis(1));
        }
        distribution.on_runs_complete();
        distribution
    }

    #[test]
    fn test_mean_and_population_variance() {
        let distribution = distribution_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((distribution.mean_by_move()[0] - 5.0).abs() < 1e-12);
        assert!((distribution.variance_by_move()[0] - 4.0).abs() < 1e-12);
        assert_eq!(distribution.minimum_by_move()[0], 2.0);
        assert_eq!(distribution.maximum_by_move()[0], 9.0);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(distribution_of(&[3.0, 1.0, 2.0]).median_by_move()[0], 2.0);
        assert_eq!(distribution_of(&[4.0, 1.0, 3.0, 2.0]).median_by_move()[0], 2.5);
        assert_eq!(distribution_of(&[7.0]).median_by_move()[0], 7.0);
    }

    #[test]
    fn test_quartiles_need_more_than_four_samples() {
        let four = distribution_of(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(four.lower_quartile_by_move()[0], None);
        assert_eq!(four.upper_quartile_by_move()[0], None);

        // Rank 1.25 and 3.75 of [1, 2, 3, 4, 5].
        let five = distribution_of(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        assert!((five.lower_quartile_by_move()[0].unwrap() - 2.25).abs() < 1e-12);
        assert!((five.upper_quartile_by_move()[0].unwrap() - 4.75).abs() < 1e-12);
        assert_eq!(five.fifth_percentile_by_move()[0], None);
    }

    #[test]
    fn test_exact_multiples_index_directly() {
        let samples: Vec<f64> = (0..8).map(f64::from).collect();
        let eight = distribution_of(&samples);
        assert_eq!(eight.lower_quartile_by_move()[0], Some(2.0));
        assert_eq!(eight.upper_quartile_by_move()[0], Some(6.0));

        let samples: Vec<f64> = (0..20).map(f64::from).collect();
        let twenty = distribution_of(&samples);
        assert_eq!(twenty.fifth_percentile_by_move()[0], Some(1.0));
        assert_eq!(twenty.ninety_fifth_percentile_by_move()[0], Some(19.0));
    }

    #[test]
    fn test_percentiles_interpolate() {
        let samples: Vec<f64> = (0..21).map(f64::from).collect();
        let distribution = distribution_of(&samples);
        // Ranks 1.05 and 19.95.
        assert!((distribution.fifth_percentile_by_move()[0].unwrap() - 1.05).abs() < 1e-9);
        assert!((distribution.ninety_fifth_percentile_by_move()[0].unwrap() - 19.95).abs() < 1e-9);

        let nineteen: Vec<f64> = (0..19).map(f64::from).collect();
        assert_eq!(distribution_of(&nineteen).fifth_percentile_by_move()[0], None);
    }

    #[test]
    fn test_percentiles_bracket_median() {
        let mut rng = Pseudorandom::from_seed(17);
        for n in 20..80 {
            let samples: Vec<f64> = (0..n).map(|_| 100.0 * rng.probability()).collect();
            let distribution = distribution_of(&samples);
            let median = distribution.median_by_move()[0];
            let fifth = distribution.fifth_percentile_by_move()[0].unwrap();
            let ninety_fifth = distribution.ninety_fifth_percentile_by_move()[0].unwrap();
            assert!(fifth <= median && median <= ninety_fifth);
            assert!(distribution.minimum_by_move()[0] < median);
            assert!(median < distribution.maximum_by_move()[0]);
        }
    }

    #[test]
    fn test_shorter_runs_only_count_their_moves() {
        let mut distribution = HeuristicDistribution::new();
        distribution.add_run(&[1.0, 2.0, 3.0], 3.0, Duration::from_millis(5));
        distribution.add_run(&[2.0], 2.0, Duration::from_millis(7));
        distribution.on_runs_complete();

        assert_eq!(distribution.count_by_move(), &[2, 1, 1]);
        assert_eq!(distribution.mean_by_move(), &[1.5, 2.0, 3.0]);
        assert_eq!(distribution.total_moves(), 4);
        assert_eq!(distribution.total_runs(), 2);
        assert_eq!(distribution.total_core_time(), Duration::from_millis(12));
        assert_eq!(distribution.best_objective(), Some(3.0));
        assert_eq!(distribution.mean_best_objective(), Some(2.5));
        assert!(distribution.is_finalized());
    }

    #[test]
    fn test_empty_distribution() {
        let mut distribution = HeuristicDistribution::new();
        distribution.on_runs_complete();
        assert!(distribution.mean_by_move().is_empty());
        assert_eq!(distribution.best_objective(), None);
        assert_eq!(distribution.mean_best_objective(), None);
    }
}
