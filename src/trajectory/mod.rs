//! # Stand trajectories
//!
//! The heuristics never model tree growth themselves. They work on a
//! `StandTrajectory`, the contract a growth model implements: a per-tree
//! harvest selection vector, a `simulate()` call that brings the trajectory up
//! to date with that selection, and valuation of the simulated result.
//!
//! `TabularTrajectory` is a deterministic implementation backed by per-tree
//! volume tables. It is small enough for tests and benchmarks while still
//! giving the heuristics real trade-offs between thinning early and growing on.

use std::fmt::Debug;

use crate::error::Result;

mod tabular;

pub use tabular::TabularTrajectory;

/// Harvest period code stored per tree in a selection vector.
pub type HarvestPeriod = u16;

/// Reserved selection code for a tree that is never thinned.
pub const NO_HARVEST: HarvestPeriod = 0;

/// How the percentages of a thinning prescription are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrescriptionUnits {
    /// Percentages are shares of the stems present at the thin.
    #[default]
    StemPercentageRemoved,
    /// Percentages are shares of basal area to leave standing.
    BasalAreaPerAcreRetained,
}

/// A thinning prescription split by removal method.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThinningPrescription {
    pub from_above_percentage: f32,
    pub proportional_percentage: f32,
    pub from_below_percentage: f32,
    pub units: PrescriptionUnits,
}

impl ThinningPrescription {
    /// Total intensity of the prescription.
    pub fn intensity(&self) -> f32 {
        self.from_above_percentage + self.proportional_percentage + self.from_below_percentage
    }
}

/// The contract between the search engine and a growth model.
///
/// A trajectory owns one selection vector with one [`HarvestPeriod`] per tree.
/// Setting a selection only marks the trajectory stale; `simulate()` brings it
/// up to date and reports how many growth model timesteps that took. Values
/// are only meaningful after `simulate()`.
pub trait StandTrajectory: Clone + Debug + Send + Sync {
    /// Number of tree records in the stand.
    fn tree_count(&self) -> usize;

    /// Configures which periods thins occur in. Selections referring to other
    /// periods revert to [`NO_HARVEST`].
    fn set_thinning_periods(&mut self, thinning_periods: &[HarvestPeriod]);

    /// [`NO_HARVEST`] followed by the configured thinning periods, ascending.
    fn valid_harvest_periods(&self) -> &[HarvestPeriod];

    /// The whole selection vector.
    fn selection(&self) -> &[HarvestPeriod];

    fn tree_selection(&self, tree: usize) -> HarvestPeriod {
        self.selection()[tree]
    }

    fn set_tree_selection(&mut self, tree: usize, period: HarvestPeriod);

    /// Copies the selection and simulated state of `other` into `self`.
    fn copy_from(&mut self, other: &Self);

    /// Simulates any changes since the last call. Returns timesteps consumed.
    fn simulate(&mut self) -> usize;

    /// Discounted financial value of the simulated trajectory when the stand
    /// is regenerated at `rotation_length`.
    fn financial_value(&self, rotation_length: HarvestPeriod, discount_rate: f64) -> f64;

    /// Merchantable volume harvested over a rotation of `rotation_length`.
    fn harvested_volume(&self, rotation_length: HarvestPeriod) -> f64;

    /// Diameter at breast height of a tree at the start of the trajectory.
    fn tree_dbh(&self, tree: usize) -> f32;

    /// Height of a tree at the start of the trajectory.
    fn tree_height(&self, tree: usize) -> f32;

    /// Selects trees for a thin in `period` according to `prescription` and
    /// returns the basal area removed. Zero is a legitimate outcome.
    fn thin_by_prescription(
        &mut self,
        period: HarvestPeriod,
        prescription: &ThinningPrescription,
    ) -> Result<f64>;
}

/// Number of positions at which two selections differ. Trees present in only
/// one of the selections count as differing.
pub fn hamming_distance(a: &[HarvestPeriod], b: &[HarvestPeriod]) -> usize {
    let differing = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
    differing + a.len().abs_diff(b.len())
}
