//! # Solution pool
//!
//! A fixed-capacity elite archive of tree selections that prefers keeping
//! diverse solutions over keeping many near-copies of the best one.
//!
//! While the pool is filling, every distinct selection is admitted. Once full,
//! a candidate must first be distinct from every member. It then replaces its
//! nearest lower-valued member if that member is further from it than the
//! closest pair currently in the pool, and otherwise replaces the lowest-valued
//! member if it beats it.
//!
//! ## Example
//!
//! ```rust
//! use harvest_search::pool::SolutionPool;
//!
//! let mut pool = SolutionPool::new(2).unwrap();
//! assert!(pool.try_add_or_replace(&[0, 1, 1], 10.0));
//! assert!(!pool.try_add_or_replace(&[0, 1, 1], 12.0));
//! assert!(pool.try_add_or_replace(&[1, 1, 1], 11.0));
//! assert_eq!(pool.high().map(|s| s.value), Some(11.0));
//! ```

mod distance;

pub use distance::NeighborDistances;

use crate::error::{OptionExt, Result, SearchError};
use crate::rng::Pseudorandom;
use crate::trajectory::{hamming_distance, HarvestPeriod};

/// A selection snapshot and the value it achieved.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EliteSolution {
    pub selection: Vec<HarvestPeriod>,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct SolutionPool {
    capacity: usize,
    solutions: Vec<EliteSolution>,
    distances: NeighborDistances,
    low: Option<usize>,
    high: Option<usize>,
    solutions_accepted: usize,
    solutions_rejected: usize,
}

impl SolutionPool {
    /// Creates an empty pool holding at most `capacity` solutions.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SearchError::Configuration(
                "Solution pool capacity must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            solutions: Vec::with_capacity(capacity),
            distances: NeighborDistances::new(capacity),
            low: None,
            high: None,
            solutions_accepted: 0,
            solutions_rejected: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.solutions.len() == self.capacity
    }

    pub fn solutions(&self) -> &[EliteSolution] {
        &self.solutions
    }

    /// Lowest-valued member.
    pub fn low(&self) -> Option<&EliteSolution> {
        self.low.map(|index| &self.solutions[index])
    }

    /// Highest-valued member.
    pub fn high(&self) -> Option<&EliteSolution> {
        self.high.map(|index| &self.solutions[index])
    }

    pub fn solutions_accepted(&self) -> usize {
        self.solutions_accepted
    }

    pub fn solutions_rejected(&self) -> usize {
        self.solutions_rejected
    }

    pub fn distances(&self) -> &NeighborDistances {
        &self.distances
    }

    /// A uniformly chosen member, used to seed construction of new runs.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::EmptyPool` if nothing has been admitted yet.
    pub fn elite_solution(&self, rng: &mut Pseudorandom) -> Result<&EliteSolution> {
        let index = rng.index(self.solutions.len());
        self.solutions
            .get(index)
            .ok_or_else_search(|| SearchError::EmptyPool)
    }

    /// Offers a solution to the pool. Returns `true` if it was admitted.
    pub fn try_add_or_replace(&mut self, selection: &[HarvestPeriod], value: f64) -> bool {
        if !value.is_finite() {
            self.solutions_rejected += 1;
            return false;
        }

        let distances: Vec<usize> = self
            .solutions
            .iter()
            .map(|member| hamming_distance(&member.selection, selection))
            .collect();
        if distances.contains(&0) {
            self.solutions_rejected += 1;
            return false;
        }

        let slot = if !self.is_full() {
            self.solutions.push(EliteSolution {
                selection: selection.to_vec(),
                value,
            });
            self.solutions.len() - 1
        } else {
            let values: Vec<f64> = self.solutions.iter().map(|s| s.value).collect();
            match select_replacement(&values, &distances, value, self.distances.minimum_distance())
            {
                Some(slot) => {
                    let member = &mut self.solutions[slot];
                    member.selection.clear();
                    member.selection.extend_from_slice(selection);
                    member.value = value;
                    slot
                }
                None => {
                    self.solutions_rejected += 1;
                    return false;
                }
            }
        };

        self.distances.place(slot, &distances);
        self.update_low_and_high();
        self.solutions_accepted += 1;
        true
    }

    fn update_low_and_high(&mut self) {
        let values = self.solutions.iter().map(|s| s.value);
        self.low = index_of_extreme(values.clone(), |candidate, current| candidate < current);
        self.high = index_of_extreme(values, |candidate, current| candidate > current);
    }
}

/// Chooses which member a full archive gives up for a new solution.
///
/// `distances[j]` is the candidate's distance to member `j`, all non-zero.
/// The nearest member valued no higher than the candidate is replaced when it
/// is further away than `minimum_neighbor_distance`; otherwise the lowest
/// valued member is replaced if the candidate beats it.
pub(crate) fn select_replacement(
    values: &[f64],
    distances: &[usize],
    value: f64,
    minimum_neighbor_distance: Option<usize>,
) -> Option<usize> {
    let mut nearest_lower: Option<usize> = None;
    for (index, (&member_value, &distance)) in values.iter().zip(distances.iter()).enumerate() {
        if member_value > value {
            continue;
        }
        if nearest_lower.map_or(true, |nearest| distance < distances[nearest]) {
            nearest_lower = Some(index);
        }
    }
    if let (Some(nearest), Some(minimum)) = (nearest_lower, minimum_neighbor_distance) {
        if distances[nearest] > minimum {
            return Some(nearest);
        }
    }

    let lowest = index_of_extreme(values.iter().copied(), |candidate, current| candidate < current)?;
    (value > values[lowest]).then_some(lowest)
}

fn index_of_extreme<I, F>(values: I, better: F) -> Option<usize>
where
    I: Iterator<Item = f64>,
    F: Fn(f64, f64) -> bool,
{
    let mut extreme: Option<(usize, f64)> = None;
    for (index, value) in values.enumerate() {
        if extreme.map_or(true, |(_, current)| better(value, current)) {
            extreme = Some((index, value));
        }
    }
    extreme.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::NO_HARVEST;

    /// A selection harvesting trees `2k` and `2k + 1` so that any two distinct
    /// `k` are exactly four apart.
    fn paired_selection(k: usize, trees: usize) -> Vec<HarvestPeriod> {
        let mut selection = vec![NO_HARVEST; trees];
        selection[2 * k] = 1;
        selection[2 * k + 1] = 1;
        selection
    }

    fn assert_matrix_consistent(pool: &SolutionPool) {
        let members = pool.solutions();
        for i in 0..members.len() {
            for j in 0..members.len() {
                assert_eq!(
                    pool.distances().distance(i, j),
                    hamming_distance(&members[i].selection, &members[j].selection)
                );
            }
        }
    }

    #[test]
    fn test_zero_capacity_is_a_configuration_error() {
        assert!(matches!(
            SolutionPool::new(0),
            Err(SearchError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_pool_admits_anything() {
        let mut pool = SolutionPool::new(3).unwrap();
        assert!(pool.try_add_or_replace(&[0, 0, 0], -5.0));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.low(), pool.high());
    }

    #[test]
    fn test_duplicates_are_rejected_while_filling_and_when_full() {
        let mut pool = SolutionPool::new(2).unwrap();
        assert!(pool.try_add_or_replace(&[0, 1], 1.0));
        assert!(!pool.try_add_or_replace(&[0, 1], 100.0));
        assert!(pool.try_add_or_replace(&[1, 1], 2.0));
        assert!(!pool.try_add_or_replace(&[1, 1], 100.0));
        assert_eq!(pool.solutions_accepted(), 2);
        assert_eq!(pool.solutions_rejected(), 2);
    }

    #[test]
    fn test_strictly_increasing_values_evict_the_oldest() {
        let capacity = 4;
        let trees = 2 * (capacity + 1);
        let mut pool = SolutionPool::new(capacity).unwrap();
        for k in 0..=capacity {
            assert!(pool.try_add_or_replace(&paired_selection(k, trees), k as f64));
        }
        assert_eq!(pool.len(), capacity);
        assert!(pool
            .solutions()
            .iter()
            .all(|member| member.selection != paired_selection(0, trees)));
        assert_eq!(pool.low().map(|s| s.value), Some(1.0));
        assert_eq!(pool.high().map(|s| s.value), Some(capacity as f64));
        assert_matrix_consistent(&pool);
    }

    #[test]
    fn test_worse_solution_is_rejected_when_full() {
        let mut pool = SolutionPool::new(2).unwrap();
        pool.try_add_or_replace(&paired_selection(0, 6), 5.0);
        pool.try_add_or_replace(&paired_selection(1, 6), 6.0);
        assert!(!pool.try_add_or_replace(&paired_selection(2, 6), 4.0));
        assert_eq!(pool.low().map(|s| s.value), Some(5.0));
    }

    #[test]
    fn test_distant_candidate_replaces_nearest_lower_member() {
        let mut pool = SolutionPool::new(3).unwrap();
        // Members 0 and 1 are one apart, member 2 is far from both.
        pool.try_add_or_replace(&[0, 0, 0, 0, 0, 0], 1.0);
        pool.try_add_or_replace(&[1, 0, 0, 0, 0, 0], 5.0);
        pool.try_add_or_replace(&[1, 1, 1, 1, 0, 0], 3.0);
        assert_eq!(pool.distances().minimum_distance(), Some(1));

        // Nearest member valued below 4.0 is member 2, two away.
        assert!(pool.try_add_or_replace(&[1, 1, 1, 1, 1, 1], 4.0));
        let values: Vec<f64> = pool.solutions().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 5.0, 4.0]);
        assert_matrix_consistent(&pool);
    }

    #[test]
    fn test_random_insertions_keep_invariants() {
        let mut rng = Pseudorandom::from_seed(99);
        let mut pool = SolutionPool::new(6).unwrap();
        for _ in 0..300 {
            let selection: Vec<HarvestPeriod> =
                (0..10).map(|_| rng.index(2) as HarvestPeriod).collect();
            let value = rng.probability() * 100.0;
            pool.try_add_or_replace(&selection, value);

            let members = pool.solutions();
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    assert_ne!(members[i].selection, members[j].selection);
                }
            }
            let low = members.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
            let high = members.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(pool.low().map(|s| s.value), Some(low));
            assert_eq!(pool.high().map(|s| s.value), Some(high));
            assert_matrix_consistent(&pool);
        }
        assert_eq!(
            pool.solutions_accepted() + pool.solutions_rejected(),
            300
        );
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let mut pool = SolutionPool::new(2).unwrap();
        assert!(!pool.try_add_or_replace(&[0, 1], f64::NAN));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_elite_solution() {
        let mut rng = Pseudorandom::from_seed(1);
        let mut pool = SolutionPool::new(2).unwrap();
        assert!(matches!(
            pool.elite_solution(&mut rng),
            Err(SearchError::EmptyPool)
        ));
        pool.try_add_or_replace(&[0, 1], 1.0);
        pool.try_add_or_replace(&[1, 1], 2.0);
        for _ in 0..20 {
            let elite = pool.elite_solution(&mut rng).unwrap();
            assert!(pool.solutions().contains(elite));
        }
    }
}
