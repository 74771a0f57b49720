use std::collections::{HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::params::{Parameters, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Input,
    Hidden,
    Output,
    Bias,
}

/// Activation tag carried by every node gene. Genotype data only: mutation
/// samples it for new hidden nodes and it travels through crossover and
/// serialization, but the compiled network applies the tanh/sigmoid layer
/// convention regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Identity,
    Tanh,
    Sigmoid,
    Sine,
    Cosine,
    Relu,
}

impl Activation {
    pub fn sample(rng: &mut StdRng) -> Activation {
        match rng.gen_range(0..6) {
            0 => Activation::Identity,
            1 => Activation::Tanh,
            2 => Activation::Sigmoid,
            3 => Activation::Sine,
            4 => Activation::Cosine,
            _ => Activation::Relu,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: usize,
    pub role: NodeRole,
    pub activation: Activation,
    /// Source-node ids over every connection into this node. Derived;
    /// recomputed after any connection change.
    pub inputs: HashSet<usize>,
}

impl NodeGene {
    pub fn new(id: usize, role: NodeRole, activation: Activation) -> NodeGene {
        NodeGene {
            id,
            role,
            activation,
            inputs: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub input: usize,
    pub output: usize,
    pub weight: f64,
    pub enabled: bool,
}

// identity is the endpoint pair; weight and enabled don't count
impl PartialEq for ConnectionGene {
    fn eq(&self, other: &Self) -> bool {
        self.input == other.input && self.output == other.output
    }
}

impl Eq for ConnectionGene {}

/// Issues monotonically increasing genome ids. Serialized alongside genomes
/// so a stored population can keep allocating without collisions.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GenomeCounter {
    next: u64,
}

impl GenomeCounter {
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub id: u64,
    pub nodes: Vec<NodeGene>,
    pub connections: Vec<ConnectionGene>,
    pub fitness: f64,
}

impl Genome {
    /// Builds the seed topology: every input feeding every hidden node,
    /// every hidden node feeding every output, and the bias feeding all
    /// hidden and output nodes. Without hidden nodes the inputs connect
    /// straight to the outputs. All weights are standard-normal draws.
    pub fn seed(settings: &Settings, counter: &mut GenomeCounter, rng: &mut StdRng) -> Genome {
        let num_inputs = settings.num_inputs;
        let num_outputs = settings.num_outputs;
        let num_hidden = settings.num_hidden;

        let bias = num_inputs;
        let outputs: Vec<usize> = (0..num_outputs).map(|i| bias + 1 + i).collect();
        let hidden: Vec<usize> = (0..num_hidden).map(|i| bias + 1 + num_outputs + i).collect();

        let mut nodes = Vec::with_capacity(num_inputs + 1 + num_outputs + num_hidden);
        for id in 0..num_inputs {
            nodes.push(NodeGene::new(id, NodeRole::Input, Activation::Identity));
        }
        nodes.push(NodeGene::new(bias, NodeRole::Bias, Activation::Identity));
        for &id in &outputs {
            nodes.push(NodeGene::new(id, NodeRole::Output, Activation::Sigmoid));
        }
        for &id in &hidden {
            nodes.push(NodeGene::new(id, NodeRole::Hidden, Activation::sample(rng)));
        }

        let mut genome = Genome {
            id: counter.next_id(),
            nodes,
            connections: Vec::new(),
            fitness: 0.0,
        };

        if hidden.is_empty() {
            for from in 0..num_inputs {
                for &to in &outputs {
                    genome.push_connection(from, to, rng.sample(StandardNormal));
                }
            }
        } else {
            for from in 0..num_inputs {
                for &to in &hidden {
                    genome.push_connection(from, to, rng.sample(StandardNormal));
                }
            }
            for &from in &hidden {
                for &to in &outputs {
                    genome.push_connection(from, to, rng.sample(StandardNormal));
                }
            }
            for &to in &hidden {
                genome.push_connection(bias, to, rng.sample(StandardNormal));
            }
        }
        for &to in &outputs {
            genome.push_connection(bias, to, rng.sample(StandardNormal));
        }

        genome.recompute_input_caches();
        genome
    }

    /// Deep copy under a fresh id. Fitness carries over as a starting point
    /// and is overwritten on the next evaluation.
    pub fn duplicate(&self, counter: &mut GenomeCounter) -> Genome {
        let mut copy = self.clone();
        copy.id = counter.next_id();
        copy
    }

    /// Fraction of the longer genome's connections that the other genome
    /// lacks, by endpoint-pair identity. Ties in "longer" pick `self`, so
    /// the result is not guaranteed symmetric.
    pub fn distance(&self, other: &Genome) -> f64 {
        let (longer, shorter) = if self.connections.len() >= other.connections.len() {
            (self, other)
        } else {
            (other, self)
        };
        if longer.connections.is_empty() {
            return 0.0;
        }
        let missing = longer
            .connections
            .iter()
            .filter(|c| !shorter.contains_connection(c.input, c.output))
            .count();
        missing as f64 / longer.connections.len() as f64
    }

    /// Child of two parents: structurally a duplicate of the fitter one,
    /// with every connection the weaker parent shares (by endpoints) blended
    /// to a uniform draw between the two parents' weights.
    pub fn crossover(
        fitter: &Genome,
        weaker: &Genome,
        counter: &mut GenomeCounter,
        rng: &mut StdRng,
    ) -> Genome {
        let mut child = fitter.duplicate(counter);
        for conn in &mut child.connections {
            if let Some(shared) = weaker.find_connection(conn.input, conn.output) {
                let lo = conn.weight.min(shared.weight);
                let hi = conn.weight.max(shared.weight);
                if hi > lo {
                    conn.weight = rng.gen_range(lo..hi);
                }
            }
        }
        child
    }

    pub fn mutate_weights(&mut self, params: &Parameters, rng: &mut StdRng) {
        for conn in &mut self.connections {
            if conn.enabled {
                if rng.gen::<f64>() < params.mutate_connection_rate {
                    if rng.gen::<f64>() < params.permute_or_reset_rate {
                        let delta: f64 = rng.sample(StandardNormal);
                        conn.weight += delta;
                    } else {
                        conn.weight = rng.sample(StandardNormal);
                    }
                }
            } else if rng.gen::<f64>() < params.re_enable_connection_rate {
                conn.enabled = true;
            }
        }
    }

    /// Samples two random nodes and tries to connect them. Rejections are
    /// silent no-ops.
    pub fn mutate_add_connection(&mut self, rng: &mut StdRng) {
        let from = self.nodes[rng.gen_range(0..self.nodes.len())].id;
        let to = self.nodes[rng.gen_range(0..self.nodes.len())].id;
        let weight = rng.sample(StandardNormal);
        self.try_add_connection(from, to, weight);
    }

    /// Guarded insertion: refuses self-loops, bias endpoints, connections
    /// into inputs or out of outputs, duplicates (either direction), and
    /// anything that would close a cycle. Returns whether the connection
    /// was added.
    pub fn try_add_connection(&mut self, from: usize, to: usize, weight: f64) -> bool {
        if from == to {
            return false;
        }
        let from_role = self.node(from).role;
        let to_role = self.node(to).role;
        if from_role == NodeRole::Bias || to_role == NodeRole::Bias {
            return false;
        }
        if to_role == NodeRole::Input || from_role == NodeRole::Output {
            return false;
        }
        if self.contains_connection(from, to) || self.contains_connection(to, from) {
            return false;
        }
        // walking forward from the destination must not lead back to the source
        if self.reaches(to, from) {
            return false;
        }

        self.connections.push(ConnectionGene {
            input: from,
            output: to,
            weight,
            enabled: true,
        });
        self.recompute_input_caches();
        debug_assert!(self.is_acyclic());
        true
    }

    /// Splits a random enabled connection (bias connections excluded) with a
    /// new hidden node: weight 1.0 into the node, the original weight out of
    /// it, plus a fresh bias connection. The split connection is disabled
    /// and its weight zeroed.
    pub fn mutate_add_node(&mut self, rng: &mut StdRng) {
        let bias = self.bias_id();
        let candidates: Vec<usize> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled && c.input != bias)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let split_idx = candidates[rng.gen_range(0..candidates.len())];
        let (from, to, weight) = {
            let split = &self.connections[split_idx];
            (split.input, split.output, split.weight)
        };

        let new_id = self.max_node_id() + 1;
        self.nodes
            .push(NodeGene::new(new_id, NodeRole::Hidden, Activation::sample(rng)));

        {
            let split = &mut self.connections[split_idx];
            split.enabled = false;
            split.weight = 0.0;
        }
        self.connections.push(ConnectionGene {
            input: from,
            output: new_id,
            weight: 1.0,
            enabled: true,
        });
        self.connections.push(ConnectionGene {
            input: new_id,
            output: to,
            weight,
            enabled: true,
        });
        self.connections.push(ConnectionGene {
            input: bias,
            output: new_id,
            weight: rng.sample(StandardNormal),
            enabled: true,
        });

        self.recompute_input_caches();
        debug_assert!(self.is_acyclic());
    }

    pub fn contains_connection(&self, from: usize, to: usize) -> bool {
        self.connections
            .iter()
            .any(|c| c.input == from && c.output == to)
    }

    fn find_connection(&self, from: usize, to: usize) -> Option<&ConnectionGene> {
        self.connections
            .iter()
            .find(|c| c.input == from && c.output == to)
    }

    pub fn node(&self, id: usize) -> &NodeGene {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .expect("node gene missing from genome")
    }

    pub fn input_ids(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Input)
            .map(|n| n.id)
            .collect()
    }

    pub fn output_ids(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Output)
            .map(|n| n.id)
            .collect()
    }

    pub fn bias_id(&self) -> usize {
        self.nodes
            .iter()
            .find(|n| n.role == NodeRole::Bias)
            .map(|n| n.id)
            .expect("bias node missing from genome")
    }

    pub fn max_node_id(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| n.id)
            .max()
            .expect("genome has no nodes")
    }

    pub fn recompute_input_caches(&mut self) {
        let edges: Vec<(usize, usize)> = self
            .connections
            .iter()
            .map(|c| (c.input, c.output))
            .collect();
        for node in &mut self.nodes {
            node.inputs.clear();
        }
        for (from, to) in edges {
            self.node_mut(to).inputs.insert(from);
        }
    }

    /// True when no node can reach itself. Walks every connection, enabled
    /// or not, since a disabled connection can come back.
    pub fn is_acyclic(&self) -> bool {
        self.nodes.iter().all(|n| !self.reaches(n.id, n.id))
    }

    // breadth-first: can `target` be reached from `start` via one or more edges?
    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for conn in &self.connections {
                if conn.input != node {
                    continue;
                }
                if conn.output == target {
                    return true;
                }
                if seen.insert(conn.output) {
                    queue.push_back(conn.output);
                }
            }
        }
        false
    }

    fn node_mut(&mut self, id: usize) -> &mut NodeGene {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .expect("node gene missing from genome")
    }

    fn push_connection(&mut self, from: usize, to: usize, weight: f64) {
        if self.contains_connection(from, to) {
            return;
        }
        self.connections.push(ConnectionGene {
            input: from,
            output: to,
            weight,
            enabled: true,
        });
    }

    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph genome {\n");
        for node in &self.nodes {
            out.push_str(&format!("  n{} [label=\"{:?} {}\"]\n", node.id, node.role, node.id));
        }
        for conn in &self.connections {
            if conn.enabled {
                out.push_str(&format!(
                    "  n{} -> n{} [label=\"{:.2}\"]\n",
                    conn.input, conn.output, conn.weight
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}
