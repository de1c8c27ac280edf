//! Generational genetic algorithm over pass sequences.

use crate::fitness::evaluate_genome;
use crate::genome::{Genome, MAX_GENOME_LEN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use umbra_core::Module;
use umbra_transforms::{PassConfig, PASS_COUNT};
use umbra_utils::errors::OptimizerError;

/// Search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaParams {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    pub elitism_ratio: f64,
}

impl Default for GaParams {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            tournament_size: 3,
            elitism_ratio: 0.1,
        }
    }
}

impl GaParams {
    /// Parameters derived from an obfuscation level: the population grows
    /// with the level while the rest comes from configuration.
    pub fn for_level(
        level: u32,
        generations: usize,
        mutation_rate: f64,
        crossover_rate: f64,
    ) -> Self {
        Self {
            population_size: 30 + level as usize * 10,
            generations,
            mutation_rate,
            crossover_rate,
            ..Self::default()
        }
    }
}

/// Population-based search for a good pass sequence.
pub struct GeneticOptimizer {
    params: GaParams,
    pass_config: PassConfig,
    rng: StdRng,
    seed: u64,
    fitness_history: Vec<f64>,
}

impl GeneticOptimizer {
    /// The RNG is seeded from the clock at construction; the seed is kept
    /// so a run can be reproduced.
    pub fn new(params: GaParams, pass_config: PassConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::with_seed(params, pass_config, seed)
    }

    pub fn with_seed(params: GaParams, pass_config: PassConfig, seed: u64) -> Self {
        Self {
            params,
            pass_config,
            rng: StdRng::seed_from_u64(seed),
            seed,
            fitness_history: Vec::new(),
        }
    }

    /// Seed this run started from, for the result record.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Best fitness per generation, filled by `optimize`.
    pub fn fitness_history(&self) -> &[f64] {
        &self.fitness_history
    }

    pub fn best_fitness(&self) -> f64 {
        self.fitness_history.iter().copied().fold(0.0, f64::max)
    }

    /// Runs the search and returns the fittest genome found.
    pub fn optimize(&mut self, module: &Module) -> Result<Genome, OptimizerError> {
        if self.params.population_size < 2 {
            return Err(OptimizerError::InvalidParams(
                "population size must be at least two".into(),
            ));
        }
        if self.params.generations == 0 {
            return Err(OptimizerError::InvalidParams(
                "generation budget must be positive".into(),
            ));
        }
        if self.params.tournament_size == 0 {
            return Err(OptimizerError::InvalidParams(
                "tournament size must be positive".into(),
            ));
        }
        self.fitness_history.clear();

        let mut population: Vec<Genome> = (0..self.params.population_size)
            .map(|_| self.random_genome())
            .collect();
        for genome in &mut population {
            genome.fitness = self.try_evaluate(module, genome);
        }
        sort_by_fitness(&mut population);
        info!(
            "initialized population of {} (best {:.2})",
            population.len(),
            population[0].fitness
        );

        for generation in 0..self.params.generations {
            let elite_count =
                (self.params.elitism_ratio * self.params.population_size as f64) as usize;
            let mut next: Vec<Genome> = population.iter().take(elite_count).cloned().collect();

            while next.len() < self.params.population_size {
                let parent_a = self.tournament(&population);
                let parent_b = self.tournament(&population);
                let mut child = if self.rng.random_bool(self.params.crossover_rate) {
                    self.crossover(&parent_a, &parent_b)
                } else {
                    parent_a.clone()
                };
                if self.rng.random_bool(self.params.mutation_rate) {
                    self.mutate(&mut child);
                }
                debug_assert!(child.is_valid());
                child.fitness = self.try_evaluate(module, &child);
                next.push(child);
            }

            population = next;
            sort_by_fitness(&mut population);
            self.fitness_history.push(population[0].fitness);

            if generation % 10 == 0 || generation + 1 == self.params.generations {
                let avg: f64 = population.iter().map(|g| g.fitness).sum::<f64>()
                    / population.len() as f64;
                info!(
                    "generation {generation}: best {:.2}, avg {avg:.2}",
                    population[0].fitness
                );
            }
        }

        Ok(population.swap_remove(0))
    }

    /// An evaluation failure costs the genome its fitness, not the run.
    fn try_evaluate(&mut self, module: &Module, genome: &Genome) -> f64 {
        let trial_seed = self.rng.random::<u64>();
        match evaluate_genome(module, genome, &self.pass_config, trial_seed) {
            Ok(fitness) => fitness,
            Err(e) => {
                warn!("fitness trial failed, assigning zero: {e}");
                0.0
            }
        }
    }

    fn random_genome(&mut self) -> Genome {
        let len = self.rng.random_range(3..=7);
        Genome::new(
            (0..len)
                .map(|_| self.rng.random_range(0..PASS_COUNT))
                .collect(),
        )
    }

    /// Best of `tournament_size` uniform picks.
    fn tournament(&mut self, population: &[Genome]) -> Genome {
        let mut best: Option<&Genome> = None;
        for _ in 0..self.params.tournament_size {
            let pick = &population[self.rng.random_range(0..population.len())];
            if best.map_or(true, |b| pick.fitness > b.fitness) {
                best = Some(pick);
            }
        }
        best.expect("tournament size is positive").clone()
    }

    /// Single-point crossover; degenerate parents pass through unchanged.
    fn crossover(&mut self, a: &Genome, b: &Genome) -> Genome {
        let min_len = a.len().min(b.len());
        if min_len <= 1 {
            return if self.rng.random_bool(0.5) {
                a.clone()
            } else {
                b.clone()
            };
        }
        let cut = self.rng.random_range(1..min_len);
        let mut genes = Vec::with_capacity(cut + b.len() - cut);
        genes.extend_from_slice(&a.genes[..cut]);
        genes.extend_from_slice(&b.genes[cut..]);
        Genome::new(genes)
    }

    /// Point, insert and delete operators, each gated at 10%.
    fn mutate(&mut self, genome: &mut Genome) {
        for gene in &mut genome.genes {
            if self.rng.random_bool(0.1) {
                *gene = self.rng.random_range(0..PASS_COUNT);
            }
        }
        if self.rng.random_bool(0.1) && genome.len() < 10 {
            let at = self.rng.random_range(0..=genome.len());
            genome
                .genes
                .insert(at, self.rng.random_range(0..PASS_COUNT));
        }
        if self.rng.random_bool(0.1) && genome.len() > 2 {
            let at = self.rng.random_range(0..genome.len());
            genome.genes.remove(at);
        }
        debug_assert!(genome.len() <= MAX_GENOME_LEN);
    }
}

fn sort_by_fitness(population: &mut [Genome]) {
    population.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
