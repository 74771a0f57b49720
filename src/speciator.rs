use log::debug;
use rand::rngs::StdRng;

use crate::genome::{Genome, GenomeCounter};
use crate::params::Settings;
use crate::specie::Species;

/// Partitions a population into species by genetic distance to each species'
/// representative, refreshes per-species statistics, and culls species that
/// have fallen past the cap and stopped improving.
pub struct Speciator {
    settings: Settings,
    next_species_id: usize,
}

impl Speciator {
    pub fn new(settings: &Settings) -> Speciator {
        Speciator {
            settings: settings.clone(),
            next_species_id: 0,
        }
    }

    /// Reassigns every genome to the closest-representative species under
    /// the compatibility threshold, spawning a new species when none is
    /// close enough. Surviving species get their representative, fitness
    /// history, stagnation counter, and average/minimum fitness refreshed.
    /// The returned list is sorted ascending by minimum fitness (lower is
    /// better); species ranked past the cap that have stagnated are removed
    /// after their members are replaced in the store with fresh seed
    /// genomes.
    pub fn generate_species(
        &mut self,
        mut species: Vec<Species>,
        members: &mut [Genome],
        counter: &mut GenomeCounter,
        rng: &mut StdRng,
    ) -> Vec<Species> {
        let threshold = self.settings.parameters.compatibility_threshold;

        // representatives survive from last generation, member lists don't
        for specie in &mut species {
            specie.members.clear();
        }

        for (idx, genome) in members.iter().enumerate() {
            let closest = species
                .iter()
                .enumerate()
                .map(|(s, specie)| (s, genome.distance(&specie.representative)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).expect("distance must not be NaN"));
            match closest {
                Some((s, d)) if d < threshold => species[s].members.push(idx),
                _ => {
                    let mut specie = Species::from_rep(self.next_species_id, genome.clone());
                    self.next_species_id += 1;
                    specie.members.push(idx);
                    debug!("genome {} founds species {}", genome.id, specie.id);
                    species.push(specie);
                }
            }
        }

        species.retain(|s| !s.members.is_empty());

        for specie in &mut species {
            specie.representative = members[specie.members[0]].clone();

            let fitnesses: Vec<f64> = specie
                .members
                .iter()
                .map(|&m| members[m].fitness)
                .collect();
            let avg = fitnesses.iter().sum::<f64>() / fitnesses.len() as f64;
            let min = fitnesses.iter().cloned().fold(f64::INFINITY, f64::min);

            let best_seen = specie
                .fitness_history
                .iter()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            if avg < best_seen {
                specie.stagnation = 0;
            } else {
                specie.stagnation += 1;
            }
            specie.fitness_history.push(avg);
            specie.avg_fitness = avg;
            specie.min_fitness = min;
        }

        species.sort_by(|a, b| {
            a.min_fitness
                .partial_cmp(&b.min_fitness)
                .expect("fitness must not be NaN")
        });

        let cap = self.settings.parameters.species_cap;
        let limit = self.settings.parameters.stagnation_limit;
        let mut kept = Vec::with_capacity(species.len());
        for (rank, specie) in species.into_iter().enumerate() {
            if rank >= cap && specie.is_stagnant(limit) {
                debug!(
                    "species {} culled after {} stagnant generations",
                    specie.id, specie.stagnation
                );
                for &m in &specie.members {
                    members[m] = Genome::seed(&self.settings, counter, rng);
                }
            } else {
                kept.push(specie);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Activation, ConnectionGene, NodeGene, NodeRole};
    use crate::params::Parameters;
    use rand::SeedableRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn settings(threshold: f64) -> Settings {
        Settings {
            num_inputs: 2,
            num_hidden: 1,
            num_outputs: 1,
            population_size: 4,
            parameters: Parameters {
                compatibility_threshold: threshold,
                ..Default::default()
            },
        }
    }

    fn conn(input: usize, output: usize) -> ConnectionGene {
        ConnectionGene {
            input,
            output,
            weight: 1.0,
            enabled: true,
        }
    }

    // two inputs, bias, one output; wiring picked per genome
    fn genome_with(id: u64, connections: Vec<ConnectionGene>, fitness: f64) -> Genome {
        let nodes = vec![
            NodeGene::new(0, NodeRole::Input, Activation::Identity),
            NodeGene::new(1, NodeRole::Input, Activation::Identity),
            NodeGene::new(2, NodeRole::Bias, Activation::Identity),
            NodeGene::new(3, NodeRole::Output, Activation::Sigmoid),
        ];
        let mut genome = Genome {
            id,
            nodes,
            connections,
            fitness,
        };
        genome.recompute_input_caches();
        genome
    }

    #[test]
    fn similar_genomes_share_one_species() {
        let mut speciator = Speciator::new(&settings(0.4));
        let mut members = vec![
            genome_with(0, vec![conn(0, 3), conn(1, 3)], 2.0),
            genome_with(1, vec![conn(0, 3), conn(1, 3)], 4.0),
        ];
        let species = speciator.generate_species(
            Vec::new(),
            &mut members,
            &mut GenomeCounter::default(),
            &mut rng(1),
        );

        assert_eq!(species.len(), 1);
        assert_eq!(species[0].members, vec![0, 1]);
        assert_eq!(species[0].avg_fitness, 3.0);
        assert_eq!(species[0].min_fitness, 2.0);
    }

    #[test]
    fn distant_genome_spawns_a_new_species() {
        let mut speciator = Speciator::new(&settings(0.4));
        let mut members = vec![
            genome_with(0, vec![conn(0, 3), conn(1, 3)], 2.0),
            genome_with(1, vec![conn(2, 3)], 5.0),
        ];
        let species = speciator.generate_species(
            Vec::new(),
            &mut members,
            &mut GenomeCounter::default(),
            &mut rng(2),
        );

        assert_eq!(species.len(), 2);
        // ascending by minimum fitness
        assert_eq!(species[0].min_fitness, 2.0);
        assert_eq!(species[1].min_fitness, 5.0);
        assert_eq!(species[0].members.len(), 1);
        assert_eq!(species[1].members.len(), 1);
    }

    #[test]
    fn stagnation_counts_generations_without_improvement() {
        let mut speciator = Speciator::new(&settings(0.4));
        let mut members = vec![genome_with(0, vec![conn(0, 3)], 5.0)];
        let mut counter = GenomeCounter::default();
        let mut r = rng(3);

        let species = speciator.generate_species(Vec::new(), &mut members, &mut counter, &mut r);
        assert_eq!(species[0].stagnation, 0, "first generation always improves");

        let species = speciator.generate_species(species, &mut members, &mut counter, &mut r);
        assert_eq!(species[0].stagnation, 1, "same fitness is no improvement");

        members[0].fitness = 4.0;
        let species = speciator.generate_species(species, &mut members, &mut counter, &mut r);
        assert_eq!(species[0].stagnation, 0, "lower fitness resets the counter");
        assert_eq!(species[0].fitness_history, vec![5.0, 5.0, 4.0]);
    }

    #[test]
    fn stagnant_species_past_the_cap_is_reset() {
        let mut settings = settings(0.4);
        settings.parameters.species_cap = 1;
        settings.parameters.stagnation_limit = 0;
        let mut speciator = Speciator::new(&settings);

        let mut members = vec![
            genome_with(0, vec![conn(0, 3), conn(1, 3)], 2.0),
            genome_with(1, vec![conn(2, 3)], 5.0),
        ];
        let mut counter = GenomeCounter::default();
        let species = speciator.generate_species(
            Vec::new(),
            &mut members,
            &mut counter,
            &mut rng(4),
        );

        assert_eq!(species.len(), 1, "worst species culled");
        assert_eq!(species[0].min_fitness, 2.0);
        // the culled species' member was rebuilt from the seed topology
        assert!(members[1].contains_connection(0, 4));
        assert_eq!(members[1].nodes.len(), 5);
    }
}
