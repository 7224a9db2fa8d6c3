//! # Results
//!
//! The result grid holds one [`HeuristicResult`] per valid grid cell: a
//! [`SolutionPool`] of diverse elite schedules and a
//! [`HeuristicDistribution`] of the move series of every run at that cell.
//!
//! Cells are indexed by [`GridPosition`]. Runs that evaluate every rotation
//! and discount rate at once are scattered into each sub-cell they cover;
//! their performance counters go to the first sub-cell only so cell counters
//! never count a run twice. Grid-wide totals count every run exactly once.

use std::time::Duration;

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::pool::{EliteSolution, SolutionPool};

mod distribution;
mod position;

pub use distribution::HeuristicDistribution;
pub use position::GridPosition;

/// Number of entries along each axis of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub discount_rates: usize,
    pub first_thin_periods: usize,
    pub second_thin_periods: usize,
    pub third_thin_periods: usize,
    pub rotation_lengths: usize,
    pub parameters: usize,
}

impl GridShape {
    /// Number of concrete cells the shape can address.
    pub fn capacity(&self) -> usize {
        self.discount_rates
            * self.first_thin_periods
            * self.second_thin_periods
            * self.third_thin_periods
            * self.rotation_lengths
            * self.parameters
    }

    fn index_of(&self, position: &GridPosition) -> Option<usize> {
        let rate = position.discount_rate_index?;
        let rotation = position.rotation_index?;
        if rate >= self.discount_rates
            || position.first_thin_period_index >= self.first_thin_periods
            || position.second_thin_period_index >= self.second_thin_periods
            || position.third_thin_period_index >= self.third_thin_periods
            || rotation >= self.rotation_lengths
            || position.parameter_index >= self.parameters
        {
            return None;
        }
        let mut index = position.parameter_index;
        index = index * self.rotation_lengths + rotation;
        index = index * self.third_thin_periods + position.third_thin_period_index;
        index = index * self.second_thin_periods + position.second_thin_period_index;
        index = index * self.first_thin_periods + position.first_thin_period_index;
        Some(index * self.discount_rates + rate)
    }
}

/// Everything known about one grid cell.
#[derive(Debug, Clone)]
pub struct HeuristicResult {
    pool: SolutionPool,
    distribution: HeuristicDistribution,
    counters: PerformanceCounters,
}

impl HeuristicResult {
    /// # Errors
    ///
    /// Returns a configuration error if `pool_capacity` is zero.
    pub fn new(pool_capacity: usize) -> Result<Self> {
        Ok(Self {
            pool: SolutionPool::new(pool_capacity)?,
            distribution: HeuristicDistribution::new(),
            counters: PerformanceCounters::new(),
        })
    }

    pub fn pool(&self) -> &SolutionPool {
        &self.pool
    }

    pub fn distribution(&self) -> &HeuristicDistribution {
        &self.distribution
    }

    /// Counters of the runs attributed to this cell.
    pub fn counters(&self) -> &PerformanceCounters {
        &self.counters
    }

    /// Adds one run's outcome. Returns whether its solution entered the pool.
    pub fn assimilate(
        &mut self,
        solution: &EliteSolution,
        objectives_by_move: &[f64],
        counters: Option<&PerformanceCounters>,
    ) -> bool {
        let runtime = counters.map_or(Duration::ZERO, |c| c.duration);
        self.distribution
            .add_run(objectives_by_move, solution.value, runtime);
        if let Some(counters) = counters {
            self.counters += *counters;
        }
        self.pool
            .try_add_or_replace(&solution.selection, solution.value)
    }
}

/// The result grid.
#[derive(Debug, Clone)]
pub struct HeuristicResults {
    shape: GridShape,
    pool_capacity: usize,
    cells: Vec<Option<HeuristicResult>>,
    cell_positions: Vec<GridPosition>,
    positions: Vec<GridPosition>,
    total_counters: PerformanceCounters,
    runs_completed: usize,
}

impl HeuristicResults {
    /// # Errors
    ///
    /// Returns a configuration error if any axis is empty or the pool
    /// capacity is zero.
    pub fn new(shape: GridShape, pool_capacity: usize) -> Result<Self> {
        if shape.capacity() == 0 {
            return Err(SearchError::Configuration(format!(
                "Every grid axis needs at least one entry, got {:?}",
                shape
            )));
        }
        if pool_capacity == 0 {
            return Err(SearchError::Configuration(
                "Solution pool size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            shape,
            pool_capacity,
            cells: vec![None; shape.capacity()],
            cell_positions: Vec::new(),
            positions: Vec::new(),
            total_counters: PerformanceCounters::new(),
            runs_completed: 0,
        })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Records a dispatched position. Concrete positions also get a cell.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the position lies outside the grid.
    pub fn add_position(&mut self, position: GridPosition) -> Result<()> {
        if !position.covers_all_rotations_and_rates() {
            self.add_cell(position)?;
        }
        self.positions.push(position);
        Ok(())
    }

    /// Creates the cell at a concrete position if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the position is not concrete or lies
    /// outside the grid.
    pub fn add_cell(&mut self, position: GridPosition) -> Result<()> {
        let index = self.shape.index_of(&position).ok_or_else(|| {
            SearchError::Configuration(format!("No grid cell at {}", position))
        })?;
        if self.cells[index].is_none() {
            self.cells[index] = Some(HeuristicResult::new(self.pool_capacity)?);
            self.cell_positions.push(position);
        }
        Ok(())
    }

    /// Positions in the order they were dispatched.
    pub fn positions(&self) -> &[GridPosition] {
        &self.positions
    }

    pub fn cell(&self, position: &GridPosition) -> Option<&HeuristicResult> {
        self.shape
            .index_of(position)
            .and_then(|index| self.cells[index].as_ref())
    }

    fn cell_mut(&mut self, position: &GridPosition) -> Option<&mut HeuristicResult> {
        self.shape
            .index_of(position)
            .and_then(|index| self.cells[index].as_mut())
    }

    /// Cells with their positions, in creation order.
    pub fn cells(&self) -> impl Iterator<Item = (GridPosition, &HeuristicResult)> + '_ {
        self.cell_positions
            .iter()
            .filter_map(move |position| self.cell(position).map(|cell| (*position, cell)))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cell_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_positions.is_empty()
    }

    /// Counters summed over every completed run.
    pub fn total_counters(&self) -> &PerformanceCounters {
        &self.total_counters
    }

    pub fn runs_completed(&self) -> usize {
        self.runs_completed
    }

    /// Adds a run at a concrete position.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no cell exists at `position`.
    pub fn assimilate(
        &mut self,
        position: &GridPosition,
        solution: &EliteSolution,
        objectives_by_move: &[f64],
        counters: &PerformanceCounters,
    ) -> Result<bool> {
        let cell = self.cell_mut(position).ok_or_else(|| {
            SearchError::Configuration(format!("No grid cell at {}", position))
        })?;
        let added = cell.assimilate(solution, objectives_by_move, Some(counters));
        self.total_counters += *counters;
        self.runs_completed += 1;
        Ok(added)
    }

    /// Adds a run that evaluated every rotation and discount rate into each
    /// existing sub-cell `best_for` has a solution for. Counters go to the
    /// first sub-cell touched. Returns the number of sub-cells filled.
    pub fn scatter<F>(
        &mut self,
        position: &GridPosition,
        best_for: F,
        objectives_by_move: &[f64],
        counters: &PerformanceCounters,
    ) -> usize
    where
        F: Fn(usize, usize) -> Option<EliteSolution>,
    {
        let mut filled = 0;
        for rotation_index in 0..self.shape.rotation_lengths {
            for rate_index in 0..self.shape.discount_rates {
                let Some(solution) = best_for(rotation_index, rate_index) else {
                    continue;
                };
                let sub_cell = position.at(rotation_index, rate_index);
                let Some(cell) = self.cell_mut(&sub_cell) else {
                    continue;
                };
                let attributed = (filled == 0).then_some(counters);
                cell.assimilate(&solution, objectives_by_move, attributed);
                filled += 1;
            }
        }
        self.total_counters += *counters;
        self.runs_completed += 1;
        filled
    }

    /// Finalizes the distribution of every cell.
    pub fn on_runs_complete(&mut self) {
        for cell in self.cells.iter_mut().flatten() {
            cell.distribution.on_runs_complete();
        }
    }

    /// The cell holding the highest pool value.
    pub fn best_cell(&self) -> Option<(GridPosition, &HeuristicResult)> {
        self.cells()
            .filter_map(|(position, cell)| cell.pool.high().map(|high| (position, cell, high.value)))
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(position, cell, _)| (position, cell))
    }
}
