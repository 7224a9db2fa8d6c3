//! # Genetic algorithm
//!
//! Evolves a population of tree selections. Parents are drawn from a mating
//! distribution that mixes fitness-proportional and uniform shares, produce
//! two children by single point or uniform crossover, and each child may have
//! two of its trees swapped. Children enter the population either
//! generationally (fittest of the family survives) or in steady state
//! through one of the replacement strategies.
//!
//! Evolution stops after `maximum_generations` or once the standard deviation
//! of fitness falls below `end_standard_deviation`.

mod population;

pub use population::{
    stratified_selections, Population, PopulationInitializationMethod,
    PopulationReplacementStrategy,
};

use crate::counters::PerformanceCounters;
use crate::error::{Result, SearchError};
use crate::rng::Pseudorandom;
use crate::trajectory::{HarvestPeriod, StandTrajectory};

use super::{validate_probability, Heuristic, HeuristicCore, RunParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrossoverMethod {
    #[default]
    SinglePoint,
    Uniform,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneticParameters {
    pub population_size: usize,
    pub maximum_generations: usize,
    pub end_standard_deviation: f64,
    pub mutation_probability: f64,
    /// Share of the mating distribution spread evenly over all individuals.
    pub reserved_population_proportion: f64,
    pub crossover: CrossoverMethod,
    /// Per-tree exchange probability of uniform crossover.
    pub crossover_probability: f64,
    pub initialization_method: PopulationInitializationMethod,
    pub initialization_classes: usize,
    pub replacement_strategy: PopulationReplacementStrategy,
}

impl Default for GeneticParameters {
    fn default() -> Self {
        Self {
            population_size: 30,
            maximum_generations: 50,
            end_standard_deviation: 0.01,
            mutation_probability: 0.5,
            reserved_population_proportion: 0.5,
            crossover: CrossoverMethod::SinglePoint,
            crossover_probability: 0.5,
            initialization_method: PopulationInitializationMethod::DiameterClass,
            initialization_classes: 5,
            replacement_strategy: PopulationReplacementStrategy::FittestOfFamily,
        }
    }
}

impl GeneticParameters {
    pub fn with_population_size(mut self, population_size: usize) -> Self {
        self.population_size = population_size;
        self
    }

    pub fn with_maximum_generations(mut self, maximum_generations: usize) -> Self {
        self.maximum_generations = maximum_generations;
        self
    }

    pub fn with_end_standard_deviation(mut self, end_standard_deviation: f64) -> Self {
        self.end_standard_deviation = end_standard_deviation;
        self
    }

    pub fn with_mutation_probability(mut self, probability: f64) -> Self {
        self.mutation_probability = probability;
        self
    }

    pub fn with_uniform_crossover(mut self, probability: f64) -> Self {
        self.crossover = CrossoverMethod::Uniform;
        self.crossover_probability = probability;
        self
    }

    pub fn with_initialization(
        mut self,
        method: PopulationInitializationMethod,
        classes: usize,
    ) -> Self {
        self.initialization_method = method;
        self.initialization_classes = classes;
        self
    }

    pub fn with_replacement_strategy(mut self, strategy: PopulationReplacementStrategy) -> Self {
        self.replacement_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(SearchError::Configuration(
                "Population size must be greater than 0".to_string(),
            ));
        }
        if self.maximum_generations == 0 {
            return Err(SearchError::Configuration(
                "Maximum generations must be greater than 0".to_string(),
            ));
        }
        if self.initialization_classes == 0 {
            return Err(SearchError::Configuration(
                "Initialization classes must be greater than 0".to_string(),
            ));
        }
        if !self.end_standard_deviation.is_finite() || self.end_standard_deviation < 0.0 {
            return Err(SearchError::Configuration(format!(
                "End standard deviation must be a non-negative number, got {}",
                self.end_standard_deviation
            )));
        }
        validate_probability("Mutation probability", self.mutation_probability)?;
        validate_probability(
            "Reserved population proportion",
            self.reserved_population_proportion,
        )?;
        validate_probability("Crossover probability", self.crossover_probability)
    }

    /// Whether a population with this fitness variance has stopped evolving.
    /// The variance must fall strictly below the squared end deviation.
    pub fn has_converged(&self, fitness_variance: f64) -> bool {
        fitness_variance < self.end_standard_deviation.powi(2)
    }
}

#[derive(Debug, Clone)]
pub struct GeneticAlgorithm<T: StandTrajectory> {
    core: HeuristicCore<T>,
    parameters: GeneticParameters,
    seeded: bool,
    population: Option<Population>,
    variance_by_generation: Vec<f64>,
}

impl<T: StandTrajectory> GeneticAlgorithm<T> {
    /// # Errors
    ///
    /// Returns a configuration error if the parameters are invalid.
    pub fn new(stand: &T, parameters: GeneticParameters, rng: Pseudorandom) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            core: HeuristicCore::new(stand, rng),
            parameters,
            seeded: false,
            population: None,
            variance_by_generation: Vec::new(),
        })
    }

    pub fn parameters(&self) -> &GeneticParameters {
        &self.parameters
    }

    /// The population at the end of the last run.
    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    /// Fitness variance of the initial population and after each generation.
    pub fn variance_by_generation(&self) -> &[f64] {
        &self.variance_by_generation
    }

    fn evaluate(&mut self, selection: &[HarvestPeriod], counters: &mut PerformanceCounters) -> f64 {
        for (tree, &period) in selection.iter().enumerate() {
            self.core.candidate.set_tree_selection(tree, period);
        }
        counters.growth_model_timesteps += self.core.candidate.simulate();
        let objective = self.core.objective(&self.core.candidate);
        if objective > self.core.best_objective {
            self.core.best.copy_from(&self.core.candidate);
            self.core.best_objective = objective;
        }
        objective
    }

    fn breed(
        &mut self,
        population: &Population,
        counters: &mut PerformanceCounters,
    ) -> (usize, usize, [(Vec<HarvestPeriod>, f64); 2]) {
        let (first, second) = population.find_parents(&mut self.core.rng);
        let (mut child1, mut child2) = match self.parameters.crossover {
            CrossoverMethod::SinglePoint => {
                population.crossover_single_point(first, second, &mut self.core.rng)
            }
            CrossoverMethod::Uniform => population.crossover_uniform(
                first,
                second,
                self.parameters.crossover_probability,
                &mut self.core.rng,
            ),
        };
        for child in [&mut child1, &mut child2] {
            if self.core.rng.chance(self.parameters.mutation_probability) {
                Population::mutate(child, &mut self.core.rng);
            }
        }
        let fitness1 = self.evaluate(&child1, counters);
        let fitness2 = self.evaluate(&child2, counters);
        (first, second, [(child1, fitness1), (child2, fitness2)])
    }

    fn next_generation(&mut self, population: &mut Population, counters: &mut PerformanceCounters) {
        let size = population.len();
        let mut individuals = Vec::with_capacity(size);
        let mut fitness = Vec::with_capacity(size);
        for _ in 0..size {
            let (first, second, children) = self.breed(population, counters);
            let parent = if population.fitness()[first] >= population.fitness()[second] {
                first
            } else {
                second
            };
            let parent_fitness = population.fitness()[parent];
            let [(child1, fitness1), (child2, fitness2)] = children;
            let (child, child_fitness) = if fitness1 >= fitness2 {
                (child1, fitness1)
            } else {
                (child2, fitness2)
            };

            if child_fitness > parent_fitness {
                individuals.push(child);
                fitness.push(child_fitness);
                counters.moves_accepted += 1;
            } else {
                individuals.push(population.individual(parent).to_vec());
                fitness.push(parent_fitness);
                counters.moves_rejected += 1;
            }
            self.core
                .moves
                .push(self.core.best_objective, child_fitness, None);
        }
        population.replace_generation(individuals, fitness);
    }

    fn steady_state_generation(
        &mut self,
        population: &mut Population,
        counters: &mut PerformanceCounters,
    ) {
        for _ in 0..population.len() {
            let (_, _, children) = self.breed(population, counters);
            let mut best_child_fitness = f64::NEG_INFINITY;
            for (child, child_fitness) in children {
                best_child_fitness = best_child_fitness.max(child_fitness);
                if population.try_replace(&child, child_fitness, self.parameters.replacement_strategy)
                {
                    counters.moves_accepted += 1;
                } else {
                    counters.moves_rejected += 1;
                }
            }
            self.core
                .moves
                .push(self.core.best_objective, best_child_fitness, None);
        }
    }
}

impl<T: StandTrajectory> Heuristic<T> for GeneticAlgorithm<T> {
    fn name(&self) -> &'static str {
        "genetic"
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

    fn construct(
        &mut self,
        run: &RunParameters,
        seed: Option<&[HarvestPeriod]>,
    ) -> Result<PerformanceCounters> {
        self.seeded = seed.is_some();
        self.core.prepare(run);
        self.core.construct(seed, 0.0)
    }

    fn search(&mut self, counters: &mut PerformanceCounters) -> Result<()> {
        let (mut selections, randomized) = stratified_selections(
            &self.core.current,
            self.parameters.population_size,
            self.parameters.initialization_method,
            self.parameters.initialization_classes,
            &mut self.core.rng,
        );
        counters.trees_randomized_in_construction += randomized;
        if self.seeded {
            selections[0] = self.core.current.selection().to_vec();
        }

        let fitness: Vec<f64> = selections
            .iter()
            .map(|selection| self.evaluate(selection, counters))
            .collect();
        let mut population = Population::new(
            selections,
            fitness,
            self.parameters.reserved_population_proportion,
        );

        self.variance_by_generation.clear();
        self.variance_by_generation.push(population.fitness_variance());
        for _ in 0..self.parameters.maximum_generations {
            if self.parameters.has_converged(population.fitness_variance()) {
                break;
            }
            population.recalculate_mating_distribution();
            match self.parameters.replacement_strategy {
                PopulationReplacementStrategy::FittestOfFamily => {
                    self.next_generation(&mut population, counters)
                }
                _ => self.steady_state_generation(&mut population, counters),
            }
            self.variance_by_generation.push(population.fitness_variance());
        }

        self.core.current.copy_from(&self.core.best);
        self.core.candidate.copy_from(&self.core.best);
        self.core.current_objective = self.core.best_objective;
        self.population = Some(population);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TabularTrajectory;

    fn run_genetic(parameters: GeneticParameters, seed: u64) -> GeneticAlgorithm<TabularTrajectory> {
        let stand = TabularTrajectory::synthetic(40, 10, 31);
        let mut genetic =
            GeneticAlgorithm::new(&stand, parameters, Pseudorandom::from_seed(seed)).unwrap();
        let run = RunParameters::new(vec![3], 10, 0.05);
        genetic.run(&run, None).unwrap();
        genetic
    }

    #[test]
    fn test_invalid_parameters() {
        let stand = TabularTrajectory::synthetic(5, 4, 1);
        for parameters in [
            GeneticParameters::default().with_population_size(0),
            GeneticParameters::default().with_maximum_generations(0),
            GeneticParameters::default().with_mutation_probability(1.5),
            GeneticParameters::default().with_end_standard_deviation(-1.0),
            GeneticParameters::default().with_initialization(
                PopulationInitializationMethod::DiameterClass,
                0,
            ),
        ] {
            assert!(matches!(
                GeneticAlgorithm::new(&stand, parameters, Pseudorandom::from_seed(1)),
                Err(SearchError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_best_is_never_lost() {
        let genetic = run_genetic(GeneticParameters::default().with_maximum_generations(10), 3);
        let best = genetic.best_objective();
        let population = genetic.population().unwrap();
        assert!(population.fitness().iter().all(|&f| f <= best));
        assert_eq!(genetic.objective(genetic.best_trajectory()), best);
        assert!(genetic
            .moves()
            .accepted_objectives()
            .windows(2)
            .all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_fittest_of_family_logs_one_move_per_mating() {
        let genetic = run_genetic(GeneticParameters::default().with_maximum_generations(15), 4);
        let generations = genetic.variance_by_generation().len() - 1;
        assert_eq!(genetic.moves().len(), 30 * generations);
        let population = genetic.population().unwrap();
        let best_in_population = population.fitness()[population.best_index().unwrap()];
        assert!(best_in_population <= genetic.best_objective());
    }

    #[test]
    fn test_variance_tends_to_decrease() {
        let mut initial = 0.0;
        let mut last = 0.0;
        for seed in 0..8 {
            let genetic = run_genetic(
                GeneticParameters::default()
                    .with_maximum_generations(20)
                    .with_end_standard_deviation(0.0),
                seed,
            );
            let variances = genetic.variance_by_generation();
            initial += variances[0];
            last += *variances.last().unwrap();
        }
        assert!(last <= initial);
    }

    #[test]
    fn test_convergence_needs_variance_strictly_below_end_deviation() {
        let parameters = GeneticParameters::default().with_end_standard_deviation(0.5);
        assert!(parameters.has_converged(0.2));
        assert!(!parameters.has_converged(0.25));
        assert!(!parameters.has_converged(0.3));

        let never = GeneticParameters::default().with_end_standard_deviation(0.0);
        assert!(!never.has_converged(0.0));
    }

    #[test]
    fn test_zero_end_deviation_runs_every_generation() {
        let genetic = run_genetic(
            GeneticParameters::default()
                .with_maximum_generations(6)
                .with_end_standard_deviation(0.0),
            12,
        );
        assert_eq!(genetic.variance_by_generation().len(), 7);
    }

    #[test]
    fn test_steady_state_strategies_run() {
        for strategy in [
            PopulationReplacementStrategy::ContributionOfDiversityReplaceWorst,
            PopulationReplacementStrategy::ReplaceWorst,
        ] {
            let genetic = run_genetic(
                GeneticParameters::default()
                    .with_maximum_generations(5)
                    .with_uniform_crossover(0.3)
                    .with_replacement_strategy(strategy),
                9,
            );
            let population = genetic.population().unwrap();
            assert_eq!(population.len(), 30);
            assert!(population
                .fitness()
                .iter()
                .all(|&f| f <= genetic.best_objective()));
        }
    }

    #[test]
    fn test_seed_enters_population() {
        let stand = TabularTrajectory::synthetic(40, 10, 31);
        let run = RunParameters::new(vec![3], 10, 0.05);
        let seed = vec![3; 40];

        let mut seeded = stand.clone();
        seeded.set_thinning_periods(&run.thinning_periods);
        for (tree, &period) in seed.iter().enumerate() {
            seeded.set_tree_selection(tree, period);
        }
        seeded.simulate();
        let seed_objective = run.objective_value(&seeded);

        let mut genetic = GeneticAlgorithm::new(
            &stand,
            GeneticParameters::default().with_maximum_generations(1),
            Pseudorandom::from_seed(2),
        )
        .unwrap();
        genetic.run(&run, Some(&seed)).unwrap();
        assert!(genetic.best_objective() >= seed_objective);
    }
}
