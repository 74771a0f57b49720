use std::collections::HashMap;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rulinalg::matrix::Matrix;

use crate::genome::{Genome, GenomeCounter};
use crate::network::{Network, NetworkError};
use crate::params::Settings;
use crate::specie::Species;
use crate::speciator::Speciator;

/// External fitness contract: one scalar per genome, aligned with the member
/// store. The engine treats lower as better throughout — species ordering,
/// stagnation, and parent selection all assume the minimization convention.
pub trait FitnessEvaluator {
    fn evaluate(
        &mut self,
        members: &[Genome],
        outputs: &HashMap<u64, Matrix<f64>>,
        coords: &Matrix<f64>,
    ) -> Vec<f64>;
}

/// Owns every genome of the current generation and drives the evolutionary
/// loop: speciation, fitness-proportionate reproduction, and batched
/// evaluation of each genome's compiled network.
pub struct Population {
    settings: Settings,
    pub members: Vec<Genome>,
    species: Vec<Species>,
    speciator: Speciator,
    counter: GenomeCounter,
    rng: StdRng,
    generation: usize,
}

impl Population {
    pub fn new(settings: &Settings, seed: u64) -> Population {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut counter = GenomeCounter::default();
        let members = (0..settings.population_size)
            .map(|_| Genome::seed(settings, &mut counter, &mut rng))
            .collect();

        Population {
            settings: settings.clone(),
            members,
            species: Vec::new(),
            speciator: Speciator::new(settings),
            counter,
            rng,
            generation: 0,
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Best genome of the current generation (lowest fitness).
    pub fn champion(&self) -> &Genome {
        self.members
            .iter()
            .min_by(|a, b| a.fitness.partial_cmp(&b.fitness).expect("fitness must not be NaN"))
            .expect("population is never empty")
    }

    /// Compiles and forward-passes every member against the same coordinate
    /// batch. Genomes share nothing mutable, so this is a parallel map.
    pub fn evaluate(
        &self,
        coords: &Matrix<f64>,
    ) -> Result<HashMap<u64, Matrix<f64>>, NetworkError> {
        self.members
            .par_iter()
            .map(|genome| {
                Network::compile(genome)
                    .forward(coords)
                    .map(|out| (genome.id, out))
            })
            .collect()
    }

    /// One full turn of the control loop: evaluate, score through the
    /// external evaluator, write fitness back, then breed the next
    /// generation.
    pub fn epoch<E: FitnessEvaluator>(
        &mut self,
        evaluator: &mut E,
        coords: &Matrix<f64>,
    ) -> Result<(), NetworkError> {
        let outputs = self.evaluate(coords)?;
        let scores = evaluator.evaluate(&self.members, &outputs, coords);
        for (genome, score) in self.members.iter_mut().zip(scores) {
            genome.fitness = score;
        }
        self.next_gen();
        Ok(())
    }

    /// Re-speciates the current members, hands each species its
    /// fitness-proportionate share of offspring, and replaces the member
    /// store with the children. Population size is conserved exactly.
    pub fn next_gen(&mut self) {
        let species = std::mem::take(&mut self.species);
        self.species = self.speciator.generate_species(
            species,
            &mut self.members,
            &mut self.counter,
            &mut self.rng,
        );

        let quotas = offspring_quotas(&self.species, self.settings.population_size);
        let mut next = Vec::with_capacity(self.settings.population_size);
        for (specie, &quota) in self.species.iter().zip(&quotas) {
            debug!(
                "species {}: avg fitness {:.4}, {} offspring",
                specie.id, specie.avg_fitness, quota
            );
            reproduce_species(
                &self.settings,
                &self.members,
                specie,
                quota,
                &mut self.counter,
                &mut self.rng,
                &mut next,
            );
        }
        debug_assert_eq!(next.len(), self.settings.population_size);

        let best = self
            .species
            .first()
            .map(|s| s.min_fitness)
            .unwrap_or(f64::INFINITY);
        info!(
            "generation {}: {} species, best fitness {:.4}",
            self.generation,
            self.species.len(),
            best
        );

        self.members = next;
        self.generation += 1;
    }
}

/// Each species earns `avg_fitness / total * size` offspring under
/// conventional rounding; the last species absorbs the remainder, and any
/// over-allocation from rounding up is walked back from the end, so the
/// total always comes out exact.
fn offspring_quotas(species: &[Species], size: usize) -> Vec<usize> {
    let mut quotas = vec![0; species.len()];
    if species.is_empty() {
        return quotas;
    }
    let total: f64 = species.iter().map(|s| s.avg_fitness).sum();
    if total > 0.0 {
        let n = species.len();
        for (quota, specie) in quotas.iter_mut().zip(species).take(n - 1) {
            *quota = (specie.avg_fitness / total * size as f64).round() as usize;
        }
    }

    let assigned: usize = quotas.iter().take(quotas.len() - 1).sum();
    let last = quotas.len() - 1;
    quotas[last] = size.saturating_sub(assigned);

    let mut excess = assigned.saturating_sub(size);
    for quota in quotas.iter_mut().rev() {
        if excess == 0 {
            break;
        }
        let cut = excess.min(*quota);
        *quota -= cut;
        excess -= cut;
    }
    quotas
}

/// Breeds one species' children into `next`. A zero quota is a no-op. Every
/// child mutates on its own stream seeded from the master in allocation
/// order, so a run is reproducible from the population seed alone.
fn reproduce_species(
    settings: &Settings,
    members: &[Genome],
    specie: &Species,
    quota: usize,
    counter: &mut GenomeCounter,
    rng: &mut StdRng,
    next: &mut Vec<Genome>,
) {
    if quota == 0 {
        return;
    }
    let params = &settings.parameters;

    // fitness-sorted members, best (lowest) first
    let mut ranked = specie.members.clone();
    ranked.sort_by(|&a, &b| {
        members[a]
            .fitness
            .partial_cmp(&members[b].fitness)
            .expect("fitness must not be NaN")
    });

    let pool_size = ((ranked.len() as f64) * params.survival_cutoff) as usize;
    let pool = &ranked[..pool_size.clamp(1, ranked.len())];

    let mut asexual = (quota as f64 * params.asexual_rate).round() as usize;
    if pool.len() == 1 {
        asexual = quota;
    }

    let mut children = Vec::with_capacity(quota);
    for slot in 0..quota {
        let mut child_rng = StdRng::seed_from_u64(rng.gen());
        let mut child = if slot < asexual {
            let parent = &members[pool[child_rng.gen_range(0..pool.len())]];
            parent.duplicate(counter)
        } else {
            let a = &members[pool[child_rng.gen_range(0..pool.len())]];
            let b = &members[pool[child_rng.gen_range(0..pool.len())]];
            let (fitter, weaker) = if a.fitness <= b.fitness { (a, b) } else { (b, a) };
            Genome::crossover(fitter, weaker, counter, &mut child_rng)
        };

        child.mutate_weights(params, &mut child_rng);
        if child_rng.gen::<f64>() < params.add_connection_rate {
            child.mutate_add_connection(&mut child_rng);
        }
        if child_rng.gen::<f64>() < params.add_node_rate {
            child.mutate_add_node(&mut child_rng);
        }
        children.push(child);
    }

    // elitism: in a big enough species, one random slot keeps the
    // top-ranked parent untouched
    if specie.members.len() > 5 {
        let slot = rng.gen_range(0..children.len());
        children[slot] = members[ranked[0]].duplicate(counter);
    }

    next.extend(children);
}
