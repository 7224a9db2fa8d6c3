use crate::counters::PerformanceCounters;
use crate::error::Result;
use crate::pool::EliteSolution;
use crate::rng::Pseudorandom;
use crate::trajectory::{HarvestPeriod, StandTrajectory};

use super::deluge::{GreatDeluge, GreatDelugeParameters};
use super::genetic::{GeneticAlgorithm, GeneticParameters};
use super::prescription::{PrescriptionEnumeration, PrescriptionParameters};
use super::tabu::{TabuParameters, TabuSearch};
use super::threshold::{ThresholdAccepting, ThresholdParameters};
use super::{Heuristic, HeuristicCore, MoveLog, RunParameters};

/// Parameters of one strategy. Each entry of a grid's parameter list becomes
/// one row of the result grid.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeuristicParameters {
    Tabu(TabuParameters),
    ThresholdAccepting(ThresholdParameters),
    GreatDeluge(GreatDelugeParameters),
    Genetic(GeneticParameters),
    Prescription(PrescriptionParameters),
}

impl HeuristicParameters {
    pub fn name(&self) -> &'static str {
        match self {
            HeuristicParameters::Tabu(_) => "tabu",
            HeuristicParameters::ThresholdAccepting(_) => "threshold accepting",
            HeuristicParameters::GreatDeluge(_) => "great deluge",
            HeuristicParameters::Genetic(_) => "genetic",
            HeuristicParameters::Prescription(_) => "prescription enumeration",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            HeuristicParameters::Tabu(p) => p.validate(),
            HeuristicParameters::ThresholdAccepting(p) => p.validate(),
            HeuristicParameters::GreatDeluge(p) => p.validate(),
            HeuristicParameters::Genetic(p) => p.validate(),
            HeuristicParameters::Prescription(p) => p.validate(),
        }
    }

    /// Whether the built strategy fills every rotation and discount rate of
    /// the grid in a single run.
    pub fn evaluates_all_rotations_and_rates(&self) -> bool {
        matches!(self, HeuristicParameters::Prescription(_))
    }

    /// Builds a fresh strategy over a copy of `stand`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn build<T: StandTrajectory>(&self, stand: &T, rng: Pseudorandom) -> Result<SearchStrategy<T>> {
        Ok(match self {
            HeuristicParameters::Tabu(p) => {
                SearchStrategy::Tabu(TabuSearch::new(stand, p.clone(), rng)?)
            }
            HeuristicParameters::ThresholdAccepting(p) => {
                SearchStrategy::ThresholdAccepting(ThresholdAccepting::new(stand, p.clone(), rng)?)
            }
            HeuristicParameters::GreatDeluge(p) => {
                SearchStrategy::GreatDeluge(GreatDeluge::new(stand, p.clone(), rng)?)
            }
            HeuristicParameters::Genetic(p) => {
                SearchStrategy::Genetic(GeneticAlgorithm::new(stand, p.clone(), rng)?)
            }
            HeuristicParameters::Prescription(p) => {
                SearchStrategy::Prescription(PrescriptionEnumeration::new(stand, p.clone(), rng)?)
            }
        })
    }
}

/// A built strategy of any kind.
#[derive(Debug, Clone)]
pub enum SearchStrategy<T: StandTrajectory> {
    Tabu(TabuSearch<T>),
    ThresholdAccepting(ThresholdAccepting<T>),
    GreatDeluge(GreatDeluge<T>),
    Genetic(GeneticAlgorithm<T>),
    Prescription(PrescriptionEnumeration<T>),
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            SearchStrategy::Tabu($inner) => $call,
            SearchStrategy::ThresholdAccepting($inner) => $call,
            SearchStrategy::GreatDeluge($inner) => $call,
            SearchStrategy::Genetic($inner) => $call,
            SearchStrategy::Prescription($inner) => $call,
        }
    };
}

impl<T: StandTrajectory> Heuristic<T> for SearchStrategy<T> {
    fn name(&self) -> &'static str {
        delegate!(self, h => h.name())
    }

    fn core(&self) -> &HeuristicCore<T> {
        delegate!(self, h => h.core())
    }

    fn core_mut(&mut self) -> &mut HeuristicCore<T> {
        delegate!(self, h => h.core_mut())
    }

    fn initial_thinning_probability(&self) -> f64 {
        delegate!(self, h => h.initial_thinning_probability())
    }

    fn check_supported(&self, run: &RunParameters) -> Result<()> {
        delegate!(self, h => h.check_supported(run))
    }

    fn construct(
        &mut self,
        run: &RunParameters,
        seed: Option<&[HarvestPeriod]>,
    ) -> Result<PerformanceCounters> {
        delegate!(self, h => h.construct(run, seed))
    }

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        delegate!(self, h => h.search(counters))
    }

    fn moves<'a>(&'a self) -> &'a MoveLog
    where
        T: 'a,
    {
        delegate!(self, h => h.moves())
    }

    fn evaluates_all_rotations_and_rates(&self) -> bool {
        delegate!(self, h => h.evaluates_all_rotations_and_rates())
    }

    fn best_for(&self, rotation_index: usize, discount_rate_index: usize) -> Option<EliteSolution> {
        delegate!(self, h => h.best_for(rotation_index, discount_rate_index))
    }
}
