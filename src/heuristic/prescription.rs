//! # Prescription enumeration
//!
//! Exhaustively evaluates thinning prescriptions instead of individual tree
//! selections. For every configured thin, each split of intensity between
//! thinning from above, proportional thinning and thinning from below is
//! tried, and the splits of all thins are crossed.
//!
//! A single enumeration scores every combination at every rotation length
//! and discount rate of the grid, so one run fills all of those positions.

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::pool::EliteSolution;
use crate::rng::Pseudorandom;
use crate::trajectory::{
    HarvestPeriod, PrescriptionUnits, StandTrajectory, ThinningPrescription, NO_HARVEST,
};

use super::{Heuristic, HeuristicCore, RunParameters};

/// Thins a prescription enumeration can cross.
const MAXIMUM_THINS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrescriptionParameters {
    pub minimum_intensity: f32,
    pub maximum_intensity: f32,
    pub intensity_step: f32,
    pub from_above_maximum_percentage: f32,
    pub proportional_maximum_percentage: f32,
    pub from_below_maximum_percentage: f32,
    pub units: PrescriptionUnits,
    /// Log every combination instead of only the best.
    pub log_all_moves: bool,
}

impl Default for PrescriptionParameters {
    fn default() -> Self {
        Self {
            minimum_intensity: 0.0,
            maximum_intensity: 50.0,
            intensity_step: 10.0,
            from_above_maximum_percentage: 100.0,
            proportional_maximum_percentage: 100.0,
            from_below_maximum_percentage: 100.0,
            units: PrescriptionUnits::StemPercentageRemoved,
            log_all_moves: false,
        }
    }
}

impl PrescriptionParameters {
    pub fn with_intensity(mut self, minimum: f32, maximum: f32, step: f32) -> Self {
        self.minimum_intensity = minimum;
        self.maximum_intensity = maximum;
        self.intensity_step = step;
        self
    }

    pub fn with_method_limits(mut self, from_above: f32, proportional: f32, from_below: f32) -> Self {
        self.from_above_maximum_percentage = from_above;
        self.proportional_maximum_percentage = proportional;
        self.from_below_maximum_percentage = from_below;
        self
    }

    pub fn with_log_all_moves(mut self, log_all_moves: bool) -> Self {
        self.log_all_moves = log_all_moves;
        self
    }

    fn maximum_for_units(&self) -> f32 {
        match self.units {
            PrescriptionUnits::StemPercentageRemoved => 100.0,
            PrescriptionUnits::BasalAreaPerAcreRetained => 1000.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, percentage) in [
            ("From above", self.from_above_maximum_percentage),
            ("Proportional", self.proportional_maximum_percentage),
            ("From below", self.from_below_maximum_percentage),
        ] {
            if !(0.0..=100.0).contains(&percentage) {
                return Err(SearchError::Configuration(format!(
                    "{} maximum percentage must be between 0 and 100, got {}",
                    name, percentage
                )));
            }
        }
        if !(0.0..=self.maximum_for_units()).contains(&self.minimum_intensity)
            || !(self.minimum_intensity..=self.maximum_for_units()).contains(&self.maximum_intensity)
        {
            return Err(SearchError::Configuration(format!(
                "Intensities must satisfy 0 <= {} <= {} <= {}",
                self.minimum_intensity,
                self.maximum_intensity,
                self.maximum_for_units()
            )));
        }
        if !(self.intensity_step > 0.0) {
            return Err(SearchError::Configuration(format!(
                "Intensity step must be greater than 0, got {}",
                self.intensity_step
            )));
        }
        Ok(())
    }

    /// Every split of intensity over the three methods, in steps of
    /// `intensity_step`, whose total lies within the intensity bounds.
    pub fn prescriptions(&self) -> Vec<ThinningPrescription> {
        let steps = |limit: f32| (limit / self.intensity_step + 1e-4).floor() as usize;
        let tolerance = 1e-3 * self.intensity_step;
        let mut prescriptions = Vec::new();
        for above in 0..=steps(self.from_above_maximum_percentage) {
            for proportional in 0..=steps(self.proportional_maximum_percentage) {
                for below in 0..=steps(self.from_below_maximum_percentage) {
                    let prescription = ThinningPrescription {
                        from_above_percentage: above as f32 * self.intensity_step,
                        proportional_percentage: proportional as f32 * self.intensity_step,
                        from_below_percentage: below as f32 * self.intensity_step,
                        units: self.units,
                    };
                    let intensity = prescription.intensity();
                    if intensity + tolerance >= self.minimum_intensity
                        && intensity <= self.maximum_intensity + tolerance
                    {
                        prescriptions.push(prescription);
                    }
                }
            }
        }
        prescriptions
    }
}

#[derive(Debug, Clone)]
pub struct PrescriptionEnumeration<T: StandTrajectory> {
    core: HeuristicCore<T>,
    parameters: PrescriptionParameters,
    best_by_rotation_and_rate: Vec<Option<EliteSolution>>,
    best_prescriptions: Vec<ThinningPrescription>,
}

impl<T: StandTrajectory> PrescriptionEnumeration<T> {
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn new(stand: &T, parameters: PrescriptionParameters, rng: Pseudorandom) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            core: HeuristicCore::new(stand, rng),
            parameters,
            best_by_rotation_and_rate: Vec::new(),
            best_prescriptions: Vec::new(),
        })
    }

    pub fn parameters(&self) -> &PrescriptionParameters {
        &self.parameters
    }

    /// Prescriptions of the best combination at the run's own rotation and
    /// discount rate, one per thin.
    pub fn best_prescriptions(&self) -> &[ThinningPrescription] {
        &self.best_prescriptions
    }

    fn apply(
        &mut self,
        thins: &[HarvestPeriod],
        prescriptions: &[ThinningPrescription],
        indices: &[usize],
        counters: &mut PerformanceCounters,
    ) -> Result<f64> {
        for tree in 0..self.core.candidate.tree_count() {
            self.core.candidate.set_tree_selection(tree, NO_HARVEST);
        }
        for (&thin, &index) in thins.iter().zip(indices) {
            self.core
                .candidate
                .thin_by_prescription(thin, &prescriptions[index])?;
        }
        counters.growth_model_timesteps += self.core.candidate.simulate();
        Ok(self.core.objective(&self.core.candidate))
    }

    fn record_across_grid(&mut self, last_thin: HarvestPeriod) {
        let run = &self.core.run;
        let rates = run.discount_rates.len();
        for (rotation_index, &rotation) in run.rotation_lengths.iter().enumerate() {
            if rotation <= last_thin {
                continue;
            }
            for (rate_index, &rate) in run.discount_rates.iter().enumerate() {
                let value = run.value_at(&self.core.candidate, rotation, rate);
                let cell = &mut self.best_by_rotation_and_rate[rotation_index * rates + rate_index];
                if cell.as_ref().map_or(true, |best| value > best.value) {
                    *cell = Some(EliteSolution {
                        selection: self.core.candidate.selection().to_vec(),
                        value,
                    });
                }
            }
        }
    }
}

impl<T: StandTrajectory> Heuristic<T> for PrescriptionEnumeration<T> {
    fn name(&self) -> &'static str {
        "prescription enumeration"
    }

    fn core(&self) -> &HeuristicCore<T> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HeuristicCore<T> {
        &mut self.core
    }

    fn initial_thinning_probability(&self) -> f64 {
        0.0
    }

    fn check_supported(&self, run: &RunParameters) -> Result<()> {
        if run.thinning_periods.len() > MAXIMUM_THINS {
            return Err(SearchError::NotSupported(format!(
                "Prescription enumeration handles at most {} thins, {} configured",
                MAXIMUM_THINS,
                run.thinning_periods.len()
            )));
        }
        Ok(())
    }

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        let thins = self.core.run.thinning_periods.clone();
        let last_thin = thins.iter().copied().max().unwrap_or(NO_HARVEST);
        let prescriptions = self.parameters.prescriptions();
        self.best_by_rotation_and_rate =
            vec![None; self.core.run.rotation_lengths.len() * self.core.run.discount_rates.len()];
        self.best_prescriptions.clear();
        if prescriptions.is_empty() && !thins.is_empty() {
            return Ok(());
        }

        let mut indices = vec![0usize; thins.len()];
        let mut best_indices: Option<Vec<usize>> = None;
        loop {
            let objective = self.apply(&thins, &prescriptions, &indices, counters)?;
            self.record_across_grid(last_thin);

            let improved = best_indices.is_none() || objective > self.core.current_objective;
            if improved {
                self.core.current.copy_from(&self.core.candidate);
                self.core.current_objective = objective;
                self.core.best.copy_from(&self.core.candidate);
                self.core.best_objective = objective;
                best_indices = Some(indices.clone());
                counters.moves_accepted += 1;
            } else {
                counters.moves_rejected += 1;
            }
            if self.parameters.log_all_moves {
                self.core
                    .moves
                    .push(self.core.current_objective, objective, None);
            }

            // Advance the odometer over thins.
            let mut position = 0;
            while position < indices.len() {
                indices[position] += 1;
                if indices[position] < prescriptions.len() {
                    break;
                }
                indices[position] = 0;
                position += 1;
            }
            if position == indices.len() {
                break;
            }
        }

        if !self.parameters.log_all_moves {
            self.core
                .moves
                .push(self.core.best_objective, self.core.best_objective, None);
        }
        self.core.candidate.copy_from(&self.core.current);
        if let Some(indices) = best_indices {
            self.best_prescriptions = indices.iter().map(|&i| prescriptions[i]).collect();
        }
        Ok(())
    }

    fn evaluates_all_rotations_and_rates(&self) -> bool {
        true
    }

    fn best_for(&self, rotation_index: usize, discount_rate_index: usize) -> Option<EliteSolution> {
        let rates = self.core.run.discount_rates.len();
        if discount_rate_index >= rates {
            return None;
        }
        self.best_by_rotation_and_rate
            .get(rotation_index * rates + discount_rate_index)
            .cloned()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TabularTrajectory;

    #[test]
    fn test_prescriptions_respect_bounds() {
        let parameters = PrescriptionParameters::default().with_intensity(10.0, 30.0, 10.0);
        let prescriptions = parameters.prescriptions();
        assert!(!prescriptions.is_empty());
        for prescription in &prescriptions {
            let intensity = prescription.intensity();
            assert!((10.0..=30.0).contains(&intensity));
        }
        // Splits of 10, 20 and 30 over three methods: 3 + 6 + 10.
        assert_eq!(prescriptions.len(), 19);
    }

    #[test]
    fn test_method_limits() {
        let parameters = PrescriptionParameters::default()
            .with_intensity(0.0, 40.0, 20.0)
            .with_method_limits(0.0, 0.0, 40.0);
        let intensities: Vec<f32> = parameters
            .prescriptions()
            .iter()
            .map(|p| p.from_below_percentage)
            .collect();
        assert_eq!(intensities, vec![0.0, 20.0, 40.0]);
    }

    #[test]
    fn test_invalid_parameters() {
        let stand = TabularTrajectory::synthetic(5, 4, 1);
        for parameters in [
            PrescriptionParameters::default().with_intensity(30.0, 20.0, 10.0),
            PrescriptionParameters::default().with_intensity(0.0, 120.0, 10.0),
            PrescriptionParameters::default().with_intensity(0.0, 50.0, 0.0),
            PrescriptionParameters::default().with_method_limits(101.0, 0.0, 0.0),
        ] {
            assert!(matches!(
                PrescriptionEnumeration::new(&stand, parameters, Pseudorandom::from_seed(1)),
                Err(SearchError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_four_thins_are_not_supported() {
        let stand = TabularTrajectory::synthetic(5, 10, 1);
        let mut heuristic = PrescriptionEnumeration::new(
            &stand,
            PrescriptionParameters::default(),
            Pseudorandom::from_seed(1),
        )
        .unwrap();
        let run = RunParameters::new(vec![1, 2, 3, 4], 10, 0.04);
        assert!(matches!(
            heuristic.run(&run, None),
            Err(SearchError::NotSupported(_))
        ));
    }

    #[test]
    fn test_enumeration_fills_every_rotation_and_rate() {
        let stand = TabularTrajectory::synthetic(30, 12, 8);
        let parameters = PrescriptionParameters::default()
            .with_intensity(0.0, 40.0, 20.0)
            .with_log_all_moves(true);
        let mut heuristic =
            PrescriptionEnumeration::new(&stand, parameters, Pseudorandom::from_seed(1)).unwrap();
        let mut run = RunParameters::new(vec![3, 6], 12, 0.04);
        run.rotation_lengths = vec![5, 9, 12];
        run.discount_rates = vec![0.04, 0.06];
        let counters = heuristic.run(&run, None).unwrap();

        let per_thin = heuristic.parameters().prescriptions().len();
        assert_eq!(heuristic.moves().len(), per_thin * per_thin);
        assert_eq!(counters.moves(), per_thin * per_thin);

        // A rotation of 5 ends before the second thin.
        assert!(heuristic.best_for(0, 0).is_none());
        for rotation_index in 1..3 {
            for rate_index in 0..2 {
                assert!(heuristic.best_for(rotation_index, rate_index).is_some());
            }
        }
        assert!(heuristic.best_for(1, 2).is_none());

        let own = heuristic.best_for(2, 0).unwrap();
        assert!((own.value - heuristic.best_objective()).abs() < 1e-9);
        assert_eq!(heuristic.best_prescriptions().len(), 2);
    }

    #[test]
    fn test_only_best_move_logged_by_default() {
        let stand = TabularTrajectory::synthetic(20, 8, 8);
        let mut heuristic = PrescriptionEnumeration::new(
            &stand,
            PrescriptionParameters::default().with_intensity(0.0, 30.0, 10.0),
            Pseudorandom::from_seed(1),
        )
        .unwrap();
        let run = RunParameters::new(vec![4], 8, 0.04);
        heuristic.run(&run, None).unwrap();
        assert_eq!(heuristic.moves().len(), 1);
        assert_eq!(
            heuristic.moves().accepted_objectives()[0],
            heuristic.best_objective()
        );
    }

    #[test]
    fn test_no_thins_evaluates_once() {
        let stand = TabularTrajectory::synthetic(10, 8, 8);
        let mut heuristic = PrescriptionEnumeration::new(
            &stand,
            PrescriptionParameters::default().with_log_all_moves(true),
            Pseudorandom::from_seed(1),
        )
        .unwrap();
        let run = RunParameters::new(Vec::new(), 8, 0.04);
        heuristic.run(&run, None).unwrap();
        assert_eq!(heuristic.moves().len(), 1);
        assert!(heuristic
            .best_trajectory()
            .selection()
            .iter()
            .all(|&p| p == NO_HARVEST));
    }
}
