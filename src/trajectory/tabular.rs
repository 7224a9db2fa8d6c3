use crate::error::{Result, SearchError};
use crate::rng::Pseudorandom;

use super::{
    HarvestPeriod, PrescriptionUnits, StandTrajectory, ThinningPrescription, NO_HARVEST,
};

/// Basal area in square feet of a tree with a one inch diameter.
const FOREST_FACTOR: f64 = 0.005454154;

/// A stand trajectory driven by per-tree volume tables.
///
/// Each tree carries its merchantable volume at the start of every planning
/// period. A tree is worth its volume in the period it is thinned, or at the
/// end of the rotation if it is retained, discounted to the present.
#[derive(Debug, Clone)]
pub struct TabularTrajectory {
    dbh: Vec<f32>,
    height: Vec<f32>,
    volume_by_period: Vec<Vec<f64>>,
    selection: Vec<HarvestPeriod>,
    valid_periods: Vec<HarvestPeriod>,
    price_per_volume: f64,
    years_per_period: f64,
    stale: bool,
}

impl TabularTrajectory {
    /// Creates a trajectory from volume tables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the tables are empty, ragged, shorter
    /// than two periods, contain non-finite values, or do not match the
    /// diameter and height lists.
    pub fn new(volume_by_period: Vec<Vec<f64>>, dbh: Vec<f32>, height: Vec<f32>) -> Result<Self> {
        if volume_by_period.is_empty() {
            return Err(SearchError::Configuration(
                "Stand must contain at least one tree".to_string(),
            ));
        }
        if dbh.len() != volume_by_period.len() || height.len() != volume_by_period.len() {
            return Err(SearchError::Configuration(format!(
                "Expected {} diameters and heights, found {} and {}",
                volume_by_period.len(),
                dbh.len(),
                height.len()
            )));
        }
        let periods = volume_by_period[0].len();
        if periods < 2 {
            return Err(SearchError::Configuration(
                "Volume tables must cover at least two periods".to_string(),
            ));
        }
        for row in &volume_by_period {
            if row.len() != periods {
                return Err(SearchError::Configuration(
                    "Volume tables must all cover the same periods".to_string(),
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(SearchError::InvalidNumericValue(
                    "Volume tables must be finite".to_string(),
                ));
            }
        }

        let tree_count = volume_by_period.len();
        Ok(Self {
            dbh,
            height,
            volume_by_period,
            selection: vec![NO_HARVEST; tree_count],
            valid_periods: vec![NO_HARVEST],
            price_per_volume: 1.0,
            years_per_period: 5.0,
            stale: true,
        })
    }

    /// Generates a stand of `tree_count` trees with compound growth curves.
    ///
    /// Smaller trees grow faster, so thinning large trees early trades
    /// against letting fast growers accumulate volume.
    pub fn synthetic(tree_count: usize, planning_periods: usize, seed: u64) -> Self {
        let mut rng = Pseudorandom::from_seed(seed);
        let periods = planning_periods.max(1) + 1;
        let mut dbh = Vec::with_capacity(tree_count);
        let mut height = Vec::with_capacity(tree_count);
        let mut volume_by_period = Vec::with_capacity(tree_count);
        for _ in 0..tree_count {
            let diameter = 4.0 + 20.0 * rng.probability() as f32;
            let tree_height = 30.0 + 4.0 * diameter + 20.0 * rng.probability() as f32;
            let initial_volume = 0.002 * (diameter * diameter * tree_height) as f64;
            let growth = 0.05 + 0.3 * (24.0 - diameter as f64) / 20.0 * rng.probability();
            let row = (0..periods)
                .map(|period| initial_volume * (1.0 + growth).powi(period as i32))
                .collect();
            dbh.push(diameter);
            height.push(tree_height);
            volume_by_period.push(row);
        }

        Self {
            dbh,
            height,
            volume_by_period,
            selection: vec![NO_HARVEST; tree_count],
            valid_periods: vec![NO_HARVEST],
            price_per_volume: 1.0,
            years_per_period: 5.0,
            stale: true,
        }
    }

    pub fn with_price(mut self, price_per_volume: f64) -> Self {
        self.price_per_volume = price_per_volume;
        self
    }

    pub fn with_years_per_period(mut self, years_per_period: f64) -> Self {
        self.years_per_period = years_per_period;
        self
    }

    /// Number of planning periods covered by the volume tables.
    pub fn planning_periods(&self) -> usize {
        self.volume_by_period.first().map_or(0, |row| row.len() - 1)
    }

    fn harvest_period_of(&self, tree: usize, rotation_length: HarvestPeriod) -> usize {
        let selected = self.selection[tree];
        let period = if selected != NO_HARVEST && selected < rotation_length {
            selected
        } else {
            rotation_length
        };
        (period as usize).min(self.planning_periods())
    }
}

impl StandTrajectory for TabularTrajectory {
    fn tree_count(&self) -> usize {
        self.selection.len()
    }

    fn set_thinning_periods(&mut self, thinning_periods: &[HarvestPeriod]) {
        let mut valid = vec![NO_HARVEST];
        valid.extend(thinning_periods.iter().copied().filter(|&p| p != NO_HARVEST));
        valid.sort_unstable();
        valid.dedup();
        for period in self.selection.iter_mut() {
            if !valid.contains(period) {
                *period = NO_HARVEST;
            }
        }
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
        if self.selection[tree] != period {
            self.selection[tree] = period;
            self.stale = true;
        }
    }

    fn copy_from(&mut self, other: &Self) {
        self.selection.clone_from(&other.selection);
        self.valid_periods.clone_from(&other.valid_periods);
        self.stale = other.stale;
    }

    fn simulate(&mut self) -> usize {
        if !self.stale {
            return 0;
        }
        self.stale = false;
        self.planning_periods()
    }

    fn financial_value(&self, rotation_length: HarvestPeriod, discount_rate: f64) -> f64 {
        (0..self.tree_count())
            .map(|tree| {
                let period = self.harvest_period_of(tree, rotation_length);
                let years = self.years_per_period * period as f64;
                self.price_per_volume * self.volume_by_period[tree][period]
                    / (1.0 + discount_rate).powf(years)
            })
            .sum()
    }

    fn harvested_volume(&self, rotation_length: HarvestPeriod) -> f64 {
        (0..self.tree_count())
            .map(|tree| self.volume_by_period[tree][self.harvest_period_of(tree, rotation_length)])
            .sum()
    }

    fn tree_dbh(&self, tree: usize) -> f32 {
        self.dbh[tree]
    }

    fn tree_height(&self, tree: usize) -> f32 {
        self.height[tree]
    }

    fn thin_by_prescription(
        &mut self,
        period: HarvestPeriod,
        prescription: &ThinningPrescription,
    ) -> Result<f64> {
        if period == NO_HARVEST || !self.valid_periods.contains(&period) {
            return Err(SearchError::Configuration(format!(
                "Period {} is not a configured thin",
                period
            )));
        }
        if prescription.units != PrescriptionUnits::StemPercentageRemoved {
            return Err(SearchError::NotSupported(
                "Tabular trajectories only thin by stem percentage".to_string(),
            ));
        }

        let mut standing: Vec<usize> = (0..self.tree_count())
            .filter(|&tree| self.selection[tree] == NO_HARVEST)
            .collect();
        standing.sort_by(|&a, &b| self.dbh[b].total_cmp(&self.dbh[a]).then(a.cmp(&b)));

        let n = standing.len();
        let share = |percentage: f32| ((n as f32 * percentage / 100.0).round() as usize).min(n);
        let above = share(prescription.from_above_percentage);
        let below = share(prescription.from_below_percentage).min(n - above);
        let middle = &standing[above..n - below];
        let proportional = share(prescription.proportional_percentage).min(middle.len());

        let mut removed: Vec<usize> = standing[..above].to_vec();
        removed.extend_from_slice(&standing[n - below..]);
        removed.extend((0..proportional).map(|k| middle[k * middle.len() / proportional]));

        let mut basal_area = 0.0;
        for tree in removed {
            let diameter = self.dbh[tree] as f64;
            basal_area += FOREST_FACTOR * diameter * diameter;
            self.set_tree_selection(tree, period);
        }
        Ok(basal_area)
    }
}
