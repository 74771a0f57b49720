use serde::{Deserialize, Serialize};

/// Seed topology and run-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub num_inputs: usize,
    pub num_hidden: usize,
    pub num_outputs: usize,
    pub population_size: usize,
    pub parameters: Parameters,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            num_inputs: 2,
            num_hidden: 1,
            num_outputs: 1,
            population_size: 150,
            parameters: Parameters::default(),
        }
    }
}

/// Per-operator rates and speciation tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    /// Chance that an enabled connection's weight is touched at all.
    pub mutate_connection_rate: f64,
    /// Given a touch, chance of a Gaussian nudge instead of a full reset.
    pub permute_or_reset_rate: f64,
    /// Chance that a disabled connection comes back.
    pub re_enable_connection_rate: f64,
    /// Chance that a child gains a fresh connection.
    pub add_connection_rate: f64,
    /// Chance that a child splits a connection with a new hidden node.
    pub add_node_rate: f64,
    /// Fraction of a species allowed to breed, best first.
    pub survival_cutoff: f64,
    /// Fraction of offspring produced without crossover.
    pub asexual_rate: f64,
    /// Representative distance under which a genome joins a species.
    pub compatibility_threshold: f64,
    /// Generations without improvement before a species counts as stagnant.
    pub stagnation_limit: usize,
    /// Number of species shielded from stagnation culling, best first.
    pub species_cap: usize,
}

impl Default for Parameters {
    fn default() -> Parameters {
        Parameters {
            mutate_connection_rate: 0.8,
            permute_or_reset_rate: 0.9,
            re_enable_connection_rate: 0.05,
            add_connection_rate: 0.05,
            add_node_rate: 0.03,
            survival_cutoff: 0.2,
            asexual_rate: 0.25,
            compatibility_threshold: 3.0,
            stagnation_limit: 15,
            species_cap: 5,
        }
    }
}
