//! NEAT-style neuroevolution of compositional pattern-producing networks.
//!
//! A [`Population`] of [`Genome`]s evolves network topologies through
//! topology-preserving mutation and crossover, clustered into [`Species`] by
//! genetic distance for fitness sharing. Each genome compiles into a
//! [`Network`]: an ordered list of dense layers that maps a batch of
//! coordinate vectors to per-sample outputs in (0, 1). Fitness comes from
//! outside through the [`FitnessEvaluator`] contract; the engine treats
//! lower values as better.
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use cppneat::{FitnessEvaluator, Genome, Population, Settings};
//! use rulinalg::matrix::{BaseMatrix, Matrix};
//!
//! // score each genome by how far its outputs sit from 0.5
//! struct Flat;
//!
//! impl FitnessEvaluator for Flat {
//!     fn evaluate(
//!         &mut self,
//!         members: &[Genome],
//!         outputs: &HashMap<u64, Matrix<f64>>,
//!         _coords: &Matrix<f64>,
//!     ) -> Vec<f64> {
//!         members
//!             .iter()
//!             .map(|genome| {
//!                 outputs[&genome.id]
//!                     .data()
//!                     .iter()
//!                     .map(|value| (value - 0.5).abs())
//!                     .sum()
//!             })
//!             .collect()
//!     }
//! }
//!
//! let settings = Settings::default();
//! let coords = Matrix::new(2, 2, vec![0.0, 0.0, 1.0, 1.0]);
//! let mut population = Population::new(&settings, 7);
//! for _ in 0..50 {
//!     population.epoch(&mut Flat, &coords).unwrap();
//! }
//! ```

pub mod genome;
pub mod network;
pub mod params;
pub mod population;
pub mod specie;
pub mod speciator;

pub use genome::{Activation, ConnectionGene, Genome, GenomeCounter, NodeGene, NodeRole};
pub use network::{Layer, Network, NetworkError};
pub use params::{Parameters, Settings};
pub use population::{FitnessEvaluator, Population};
pub use specie::Species;
pub use speciator::Speciator;
