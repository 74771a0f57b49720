use std::collections::{HashMap, HashSet};

use rulinalg::matrix::{BaseMatrix, BaseMatrixMut, Matrix};
use thiserror::Error;

use crate::genome::{Genome, NodeRole};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("coordinate batch has {found} columns, network expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },
}

/// One compiled layer: the nodes admitted in this round and a dense weight
/// matrix with a row per node already computed (inputs, bias, and every
/// earlier admission) and a column per admitted node.
#[derive(Debug)]
pub struct Layer {
    pub nodes: Vec<usize>,
    pub roles: Vec<NodeRole>,
    pub weights: Matrix<f64>,
}

/// A genome compiled down to an ordered list of dense layers, evaluated over
/// whole coordinate batches at once.
#[derive(Debug)]
pub struct Network {
    num_inputs: usize,
    layers: Vec<Layer>,
    output_columns: Vec<usize>,
}

impl Network {
    /// Topological decomposition of the genome's connection graph. The
    /// frontier starts as all inputs plus the bias; each round admits the
    /// nodes whose cached input sets are fully inside the frontier, builds
    /// their weight matrix, and grows the frontier with them. A node fed by
    /// a level-skipping connection simply waits for a later round. Stops on
    /// the first round that admits nothing. Pure with respect to the genome.
    pub fn compile(genome: &Genome) -> Network {
        let mut frontier: Vec<usize> = genome.input_ids();
        let num_inputs = frontier.len();
        frontier.push(genome.bias_id());
        let mut placed: HashSet<usize> = frontier.iter().copied().collect();
        let mut layers = Vec::new();

        loop {
            // candidates are fed by at least one placed node; admission
            // additionally requires every cached input to be placed
            let admitted: Vec<(usize, NodeRole)> = genome
                .nodes
                .iter()
                .filter(|node| !placed.contains(&node.id))
                .filter(|node| {
                    genome
                        .connections
                        .iter()
                        .any(|c| c.output == node.id && placed.contains(&c.input))
                })
                .filter(|node| node.inputs.iter().all(|src| placed.contains(src)))
                .map(|node| (node.id, node.role))
                .collect();
            if admitted.is_empty() {
                break;
            }

            let rows: HashMap<usize, usize> =
                frontier.iter().enumerate().map(|(i, &id)| (id, i)).collect();
            let cols: HashMap<usize, usize> = admitted
                .iter()
                .enumerate()
                .map(|(j, &(id, _))| (id, j))
                .collect();
            let mut weights = Matrix::zeros(frontier.len(), admitted.len());
            for conn in &genome.connections {
                if let Some(&col) = cols.get(&conn.output) {
                    let row = rows[&conn.input];
                    weights[[row, col]] = if conn.enabled { conn.weight } else { 0.0 };
                }
            }

            for &(id, _) in &admitted {
                placed.insert(id);
                frontier.push(id);
            }
            layers.push(Layer {
                nodes: admitted.iter().map(|&(id, _)| id).collect(),
                roles: admitted.iter().map(|&(_, role)| role).collect(),
                weights,
            });
        }

        let output_columns = genome
            .output_ids()
            .iter()
            .map(|id| {
                frontier
                    .iter()
                    .position(|f| f == id)
                    .expect("output node never admitted to a layer")
            })
            .collect();

        Network {
            num_inputs,
            layers,
            output_columns,
        }
    }

    /// Runs a coordinate batch (rows = samples, columns = input dimensions)
    /// through the layers. The running activation matrix starts as the batch
    /// plus a constant 1.0 bias column and grows by one column per computed
    /// node; hidden nodes get a hyperbolic tangent, output nodes the
    /// logistic sigmoid, so every returned entry lies in (0, 1).
    pub fn forward(&self, coords: &Matrix<f64>) -> Result<Matrix<f64>, NetworkError> {
        if coords.cols() != self.num_inputs {
            return Err(NetworkError::ShapeMismatch {
                expected: self.num_inputs,
                found: coords.cols(),
            });
        }

        let batch = coords.rows();
        let bias_column = Matrix::new(batch, 1, vec![1.0; batch]);
        let mut activations = coords.hcat(&bias_column);

        for layer in &self.layers {
            let mut post = &activations * &layer.weights;
            let cols = post.cols();
            let data = post.mut_data();
            for row in 0..batch {
                for (col, role) in layer.roles.iter().enumerate() {
                    let value = &mut data[row * cols + col];
                    *value = match role {
                        NodeRole::Output => sigmoid(*value),
                        _ => value.tanh(),
                    };
                }
            }
            activations = activations.hcat(&post);
        }

        Ok(activations.select_cols(&self.output_columns))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Activation, ConnectionGene, GenomeCounter, NodeGene};
    use crate::params::Settings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn conn(input: usize, output: usize, weight: f64) -> ConnectionGene {
        ConnectionGene {
            input,
            output,
            weight,
            enabled: true,
        }
    }

    fn bare_genome(nodes: Vec<NodeGene>, connections: Vec<ConnectionGene>) -> Genome {
        let mut genome = Genome {
            id: 0,
            nodes,
            connections,
            fitness: 0.0,
        };
        genome.recompute_input_caches();
        genome
    }

    fn seed_2_1_1() -> Genome {
        let settings = Settings {
            num_inputs: 2,
            num_hidden: 1,
            num_outputs: 1,
            ..Default::default()
        };
        let mut counter = GenomeCounter::default();
        Genome::seed(&settings, &mut counter, &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn seed_topology_compiles_to_two_layers() {
        let genome = seed_2_1_1();
        let network = Network::compile(&genome);

        assert_eq!(network.layers().len(), 2);
        assert_eq!(network.layers()[0].nodes, vec![4], "hidden layer first");
        assert_eq!(network.layers()[1].nodes, vec![3], "output layer last");
    }

    #[test]
    fn forward_pass_stays_in_open_unit_interval() {
        let genome = seed_2_1_1();
        let network = Network::compile(&genome);

        let coords = Matrix::new(2, 2, vec![0.0, 0.0, 1.0, 1.0]);
        let out = network.forward(&coords).unwrap();

        assert_eq!(out.rows(), 2);
        assert_eq!(out.cols(), 1);
        for value in out.data() {
            assert!(*value > 0.0 && *value < 1.0);
        }
    }

    #[test]
    fn chain_depth_matches_layer_count() {
        // 0 -> 2 -> 3 -> 4 with bias 1 into every non-input
        let nodes = vec![
            NodeGene::new(0, NodeRole::Input, Activation::Identity),
            NodeGene::new(1, NodeRole::Bias, Activation::Identity),
            NodeGene::new(2, NodeRole::Hidden, Activation::Tanh),
            NodeGene::new(3, NodeRole::Hidden, Activation::Tanh),
            NodeGene::new(4, NodeRole::Output, Activation::Sigmoid),
        ];
        let genome = bare_genome(
            nodes,
            vec![
                conn(0, 2, 0.5),
                conn(2, 3, 0.5),
                conn(3, 4, 0.5),
                conn(1, 2, 0.1),
                conn(1, 3, 0.1),
                conn(1, 4, 0.1),
            ],
        );
        let network = Network::compile(&genome);

        assert_eq!(network.layers().len(), 3);
        assert_eq!(network.layers()[0].nodes, vec![2]);
        assert_eq!(network.layers()[1].nodes, vec![3]);
        assert_eq!(network.layers()[2].nodes, vec![4]);
    }

    #[test]
    fn no_layer_contains_an_unresolved_dependency() {
        let mut counter = GenomeCounter::default();
        let settings = Settings {
            num_inputs: 3,
            num_hidden: 2,
            num_outputs: 2,
            ..Default::default()
        };
        let mut genome = Genome::seed(&settings, &mut counter, &mut StdRng::seed_from_u64(2));
        let mut rng = StdRng::seed_from_u64(3);
        for step in 0..120 {
            genome.mutate_add_connection(&mut rng);
            if step % 8 == 0 {
                genome.mutate_add_node(&mut rng);
            }
        }

        let network = Network::compile(&genome);
        let mut placed: HashSet<usize> = genome.input_ids().into_iter().collect();
        placed.insert(genome.bias_id());
        for layer in network.layers() {
            for &id in &layer.nodes {
                for src in &genome.node(id).inputs {
                    assert!(placed.contains(src), "node {} admitted before input {}", id, src);
                }
            }
            placed.extend(layer.nodes.iter().copied());
        }
        // everything reachable got a layer
        for node in &genome.nodes {
            assert!(placed.contains(&node.id));
        }
    }

    #[test]
    fn skip_connection_defers_the_destination() {
        // 0 and 1 feed hidden 3; output 4 takes the hidden node AND input 0
        let nodes = vec![
            NodeGene::new(0, NodeRole::Input, Activation::Identity),
            NodeGene::new(1, NodeRole::Input, Activation::Identity),
            NodeGene::new(2, NodeRole::Bias, Activation::Identity),
            NodeGene::new(3, NodeRole::Hidden, Activation::Tanh),
            NodeGene::new(4, NodeRole::Output, Activation::Sigmoid),
        ];
        let genome = bare_genome(
            nodes,
            vec![
                conn(0, 3, 0.5),
                conn(1, 3, 0.5),
                conn(2, 3, 0.1),
                conn(3, 4, 0.8),
                conn(0, 4, 0.3),
                conn(2, 4, 0.1),
            ],
        );
        let network = Network::compile(&genome);

        assert_eq!(network.layers().len(), 2);
        // second layer sees the full frontier: two inputs, bias, hidden
        assert_eq!(network.layers()[1].weights.rows(), 4);

        let coords = Matrix::new(1, 2, vec![0.25, -0.25]);
        let out = network.forward(&coords).unwrap();
        assert_eq!((out.rows(), out.cols()), (1, 1));
    }

    #[test]
    fn disabled_connections_contribute_nothing() {
        let nodes = vec![
            NodeGene::new(0, NodeRole::Input, Activation::Identity),
            NodeGene::new(1, NodeRole::Bias, Activation::Identity),
            NodeGene::new(2, NodeRole::Output, Activation::Sigmoid),
        ];
        let mut live = bare_genome(nodes, vec![conn(0, 2, 10.0)]);
        live.connections[0].enabled = false;
        let network = Network::compile(&live);

        let coords = Matrix::new(1, 1, vec![1.0]);
        let out = network.forward(&coords).unwrap();
        assert_eq!(out.data()[0], sigmoid(0.0));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let genome = seed_2_1_1();
        let network = Network::compile(&genome);

        let coords = Matrix::new(1, 3, vec![0.0, 0.0, 0.0]);
        match network.forward(&coords) {
            Err(NetworkError::ShapeMismatch { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 3);
            }
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
    }
}
