//! Pairwise distance bookkeeping shared by the solution pool and the genetic
//! population.
//!
//! Slots fill from zero upwards. Once placed, a slot is only ever overwritten,
//! so rows of the matrix above `occupied` are never read.

use crate::trajectory::{hamming_distance, HarvestPeriod};

/// Symmetric Hamming distance matrix with per-slot nearest neighbors and the
/// minimum distance over all pairs.
#[derive(Debug, Clone)]
pub struct NeighborDistances {
    capacity: usize,
    matrix: Vec<usize>,
    nearest: Vec<Option<usize>>,
    nearest_distance: Vec<usize>,
    occupied: usize,
    minimum: Option<(usize, usize, usize)>,
}

impl NeighborDistances {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            matrix: vec![0; capacity * capacity],
            nearest: vec![None; capacity],
            nearest_distance: vec![usize::MAX; capacity],
            occupied: 0,
            minimum: None,
        }
    }

    /// Builds the bookkeeping for a full set of selections at once.
    pub fn from_selections<S: AsRef<[HarvestPeriod]>>(selections: &[S]) -> Self {
        let mut distances = Self::new(selections.len());
        for (slot, selection) in selections.iter().enumerate() {
            let row: Vec<usize> = selections[..slot]
                .iter()
                .map(|other| hamming_distance(other.as_ref(), selection.as_ref()))
                .collect();
            distances.place(slot, &row);
        }
        distances
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn distance(&self, i: usize, j: usize) -> usize {
        self.matrix[i * self.capacity + j]
    }

    /// Closest other slot to `slot` and its distance.
    pub fn nearest_neighbor(&self, slot: usize) -> Option<(usize, usize)> {
        self.nearest[slot].map(|neighbor| (neighbor, self.nearest_distance[slot]))
    }

    /// Smallest distance between any two occupied slots.
    pub fn minimum_distance(&self) -> Option<usize> {
        self.minimum.map(|(_, _, distance)| distance)
    }

    /// Writes `slot`, either appending it or overwriting a previous occupant.
    ///
    /// `distances[j]` is the distance from the new occupant to slot `j` for
    /// every occupied `j` other than `slot`; its entry for `slot` itself, if
    /// present, is ignored.
    pub fn place(&mut self, slot: usize, distances: &[usize]) {
        debug_assert!(slot <= self.occupied && slot < self.capacity);
        let appending = slot == self.occupied;
        if appending {
            self.occupied += 1;
        }
        let n = self.occupied;
        let c = self.capacity;

        self.matrix[slot * c + slot] = 0;
        self.nearest[slot] = None;
        self.nearest_distance[slot] = usize::MAX;
        for j in (0..n).filter(|&j| j != slot) {
            let d = distances[j];
            self.matrix[slot * c + j] = d;
            self.matrix[j * c + slot] = d;
            if d < self.nearest_distance[slot] {
                self.nearest[slot] = Some(j);
                self.nearest_distance[slot] = d;
            }
        }

        for j in (0..n).filter(|&j| j != slot) {
            let d = distances[j];
            if !appending && self.nearest[j] == Some(slot) {
                if d <= self.nearest_distance[j] {
                    self.nearest_distance[j] = d;
                } else {
                    self.rescan_row(j);
                }
            } else if d < self.nearest_distance[j] {
                self.nearest[j] = Some(slot);
                self.nearest_distance[j] = d;
            }
        }

        let evicted_minimum = !appending
            && self
                .minimum
                .is_some_and(|(a, b, _)| a == slot || b == slot);
        if evicted_minimum {
            self.recompute_minimum();
        } else if let Some(neighbor) = self.nearest[slot] {
            let d = self.nearest_distance[slot];
            if self.minimum.map_or(true, |(_, _, minimum)| d < minimum) {
                self.minimum = Some((slot, neighbor, d));
            }
        }
    }

    fn rescan_row(&mut self, row: usize) {
        let c = self.capacity;
        let mut nearest = None;
        let mut nearest_distance = usize::MAX;
        for j in (0..self.occupied).filter(|&j| j != row) {
            let d = self.matrix[row * c + j];
            if d < nearest_distance {
                nearest = Some(j);
                nearest_distance = d;
            }
        }
        self.nearest[row] = nearest;
        self.nearest_distance[row] = nearest_distance;
    }

    fn recompute_minimum(&mut self) {
        self.minimum = None;
        for slot in 0..self.occupied {
            if let Some(neighbor) = self.nearest[slot] {
                let d = self.nearest_distance[slot];
                if self.minimum.map_or(true, |(_, _, minimum)| d < minimum) {
                    self.minimum = Some((slot, neighbor, d));
                }
            }
        }
    }
}
