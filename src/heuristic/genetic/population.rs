//! Population bookkeeping for the genetic algorithm: stratified construction,
//! the mating distribution, crossover and mutation operators, and
//! replacement of individuals by children.

use crate::pool::{select_replacement, NeighborDistances};
use crate::rng::Pseudorandom;
use crate::trajectory::{hamming_distance, HarvestPeriod, StandTrajectory, NO_HARVEST};

/// Floor applied to fitness when building the mating distribution so that
/// zero or negative individuals can still be drawn.
const MINIMUM_MATING_FITNESS: f64 = 0.0001;

/// How trees are grouped into classes when constructing the initial
/// population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PopulationInitializationMethod {
    /// Equal-width diameter classes.
    #[default]
    DiameterClass,
    /// Classes holding equal numbers of trees, ordered by diameter.
    DiameterQuantile,
    /// Classes holding equal numbers of trees, ordered by height.
    HeightQuantile,
}

/// How children enter the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PopulationReplacementStrategy {
    /// Generational: the fittest of two parents and their two children fills
    /// each slot of the next generation. Ties go to the parent.
    #[default]
    FittestOfFamily,
    /// Steady state: a child replaces its nearest less fit neighbor when that
    /// neighbor is further away than the closest pair in the population, and
    /// the least fit individual otherwise.
    ContributionOfDiversityReplaceWorst,
    /// Steady state: a child replaces the least fit individual if fitter.
    ReplaceWorst,
}

/// Assigns each tree to one of `classes` classes.
fn tree_classes<T: StandTrajectory>(
    stand: &T,
    method: PopulationInitializationMethod,
    classes: usize,
) -> Vec<usize> {
    let tree_count = stand.tree_count();
    let classes = classes.max(1);
    match method {
        PopulationInitializationMethod::DiameterClass => {
            let (minimum, maximum) = (0..tree_count)
                .map(|tree| stand.tree_dbh(tree))
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
                    (lo.min(d), hi.max(d))
                });
            let width = (maximum - minimum) / classes as f32;
            (0..tree_count)
                .map(|tree| {
                    if width <= 0.0 {
                        0
                    } else {
                        (((stand.tree_dbh(tree) - minimum) / width) as usize).min(classes - 1)
                    }
                })
                .collect()
        }
        PopulationInitializationMethod::DiameterQuantile
        | PopulationInitializationMethod::HeightQuantile => {
            let attribute = |tree: usize| match method {
                PopulationInitializationMethod::HeightQuantile => stand.tree_height(tree),
                _ => stand.tree_dbh(tree),
            };
            let mut order: Vec<usize> = (0..tree_count).collect();
            order.sort_by(|&a, &b| attribute(a).total_cmp(&attribute(b)).then(a.cmp(&b)));
            let mut assignment = vec![0; tree_count];
            for (rank, &tree) in order.iter().enumerate() {
                assignment[tree] = rank * classes / tree_count;
            }
            assignment
        }
    }
}

/// Builds `population_size` selections with per-class thinning probabilities
/// that advance by `classes / population_size` from one individual to the
/// next, rolling over into the following class like an odometer.
pub fn stratified_selections<T: StandTrajectory>(
    stand: &T,
    population_size: usize,
    method: PopulationInitializationMethod,
    classes: usize,
    rng: &mut Pseudorandom,
) -> (Vec<Vec<HarvestPeriod>>, usize) {
    let classes = classes.max(1);
    let tree_count = stand.tree_count();
    let thins: Vec<HarvestPeriod> = stand.valid_harvest_periods()[1..].to_vec();
    let class_of_tree = tree_classes(stand, method, classes);

    let increment = classes as f64 / population_size.max(1) as f64;
    let mut probabilities = vec![0.5 * increment; classes];
    let mut randomized = 0;
    let mut selections = Vec::with_capacity(population_size);
    for _ in 0..population_size {
        let selection: Vec<HarvestPeriod> = (0..tree_count)
            .map(|tree| {
                if !thins.is_empty() && rng.chance(probabilities[class_of_tree[tree]]) {
                    randomized += 1;
                    thins[rng.index(thins.len())]
                } else {
                    NO_HARVEST
                }
            })
            .collect();
        selections.push(selection);
        advance_class_probabilities(&mut probabilities, increment);
    }
    (selections, randomized)
}

/// Steps the lowest class probability by `increment`. A class reaching 1
/// rolls over and carries into the next class.
fn advance_class_probabilities(probabilities: &mut [f64], increment: f64) {
    for probability in probabilities.iter_mut() {
        *probability += increment;
        if *probability < 1.0 {
            break;
        }
        *probability -= 1.0;
    }
}

#[derive(Debug, Clone)]
pub struct Population {
    individuals: Vec<Vec<HarvestPeriod>>,
    fitness: Vec<f64>,
    mating_cdf: Vec<f64>,
    reserved_proportion: f64,
    distances: NeighborDistances,
}

impl Population {
    /// Wraps evaluated individuals. `fitness[i]` belongs to `individuals[i]`.
    pub fn new(
        individuals: Vec<Vec<HarvestPeriod>>,
        fitness: Vec<f64>,
        reserved_proportion: f64,
    ) -> Self {
        debug_assert_eq!(individuals.len(), fitness.len());
        let distances = NeighborDistances::from_selections(&individuals);
        Self {
            mating_cdf: vec![1.0; individuals.len()],
            individuals,
            fitness,
            reserved_proportion,
            distances,
        }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individual(&self, index: usize) -> &[HarvestPeriod] {
        &self.individuals[index]
    }

    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    pub fn mating_cdf(&self) -> &[f64] {
        &self.mating_cdf
    }

    pub fn distances(&self) -> &NeighborDistances {
        &self.distances
    }

    /// Population variance of fitness.
    pub fn fitness_variance(&self) -> f64 {
        if self.fitness.is_empty() {
            return 0.0;
        }
        let n = self.fitness.len() as f64;
        let sum: f64 = self.fitness.iter().sum();
        let sum_of_squares: f64 = self.fitness.iter().map(|f| f * f).sum();
        let mean = sum / n;
        (sum_of_squares / n - mean * mean).max(0.0)
    }

    pub fn best_index(&self) -> Option<usize> {
        self.fitness
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (index, &fitness)| match best {
                Some((_, best_fitness)) if best_fitness >= fitness => best,
                _ => Some((index, fitness)),
            })
            .map(|(index, _)| index)
    }

    fn worst_index(&self) -> Option<usize> {
        self.fitness
            .iter()
            .enumerate()
            .fold(None, |worst: Option<(usize, f64)>, (index, &fitness)| match worst {
                Some((_, worst_fitness)) if worst_fitness <= fitness => worst,
                _ => Some((index, fitness)),
            })
            .map(|(index, _)| index)
    }

    /// Rebuilds the cumulative mating distribution. A `reserved_proportion`
    /// share of the probability is spread evenly over all individuals and the
    /// rest in proportion to fitness.
    pub fn recalculate_mating_distribution(&mut self) {
        let n = self.fitness.len();
        if n == 0 {
            self.mating_cdf.clear();
            return;
        }
        let total: f64 = self
            .fitness
            .iter()
            .map(|f| f.max(MINIMUM_MATING_FITNESS))
            .sum();
        let guaranteed = self.reserved_proportion / n as f64;
        let proportional = 1.0 - self.reserved_proportion;

        self.mating_cdf.clear();
        let mut cumulative = 0.0;
        for &fitness in &self.fitness {
            cumulative += guaranteed + proportional * fitness.max(MINIMUM_MATING_FITNESS) / total;
            self.mating_cdf.push(cumulative);
        }
        if let Some(last) = self.mating_cdf.last_mut() {
            *last = 1.0;
        }
    }

    fn draw(&self, rng: &mut Pseudorandom) -> usize {
        let uniform = rng.probability();
        self.mating_cdf
            .iter()
            .position(|&cumulative| uniform <= cumulative)
            .unwrap_or(self.mating_cdf.len().saturating_sub(1))
    }

    /// Draws two parents independently. Both may be the same individual.
    pub fn find_parents(&self, rng: &mut Pseudorandom) -> (usize, usize) {
        (self.draw(rng), self.draw(rng))
    }

    /// Children exchanging tails after a random crossover point.
    pub fn crossover_single_point(
        &self,
        first: usize,
        second: usize,
        rng: &mut Pseudorandom,
    ) -> (Vec<HarvestPeriod>, Vec<HarvestPeriod>) {
        let a = &self.individuals[first];
        let b = &self.individuals[second];
        let point = rng.index(a.len() + 1);
        let mut child1 = a[..point].to_vec();
        child1.extend_from_slice(&b[point..]);
        let mut child2 = b[..point].to_vec();
        child2.extend_from_slice(&a[point..]);
        (child1, child2)
    }

    /// Children taking each differing tree from the other parent with
    /// `probability`, drawn independently for each child.
    pub fn crossover_uniform(
        &self,
        first: usize,
        second: usize,
        probability: f64,
        rng: &mut Pseudorandom,
    ) -> (Vec<HarvestPeriod>, Vec<HarvestPeriod>) {
        let a = &self.individuals[first];
        let b = &self.individuals[second];
        let mut child1 = a.clone();
        let mut child2 = b.clone();
        for tree in (0..a.len()).filter(|&tree| a[tree] != b[tree]) {
            if rng.chance(probability) {
                child1[tree] = b[tree];
            }
            if rng.chance(probability) {
                child2[tree] = a[tree];
            }
        }
        (child1, child2)
    }

    /// Swaps the periods of two random trees.
    pub fn mutate(selection: &mut [HarvestPeriod], rng: &mut Pseudorandom) {
        if selection.len() < 2 {
            return;
        }
        let first = rng.tree_index(selection.len());
        let second = rng.tree_index(selection.len());
        selection.swap(first, second);
    }

    /// Replaces the whole population with the next generation.
    pub fn replace_generation(&mut self, individuals: Vec<Vec<HarvestPeriod>>, fitness: Vec<f64>) {
        self.distances = NeighborDistances::from_selections(&individuals);
        self.individuals = individuals;
        self.fitness = fitness;
    }

    /// Offers a child to a steady state population. Returns `true` if it
    /// replaced an individual. Duplicates of existing individuals are
    /// rejected.
    pub fn try_replace(
        &mut self,
        child: &[HarvestPeriod],
        fitness: f64,
        strategy: PopulationReplacementStrategy,
    ) -> bool {
        let distances: Vec<usize> = self
            .individuals
            .iter()
            .map(|individual| hamming_distance(individual, child))
            .collect();
        if distances.contains(&0) {
            return false;
        }

        let slot = match strategy {
            PopulationReplacementStrategy::ContributionOfDiversityReplaceWorst => select_replacement(
                &self.fitness,
                &distances,
                fitness,
                self.distances.minimum_distance(),
            ),
            PopulationReplacementStrategy::ReplaceWorst
            | PopulationReplacementStrategy::FittestOfFamily => self
                .worst_index()
                .filter(|&worst| fitness > self.fitness[worst]),
        };
        let Some(slot) = slot else {
            return false;
        };

        self.individuals[slot].clear();
        self.individuals[slot].extend_from_slice(child);
        self.fitness[slot] = fitness;
        self.distances.place(slot, &distances);
        true
    }
}
