use std::collections::HashMap;

use cppneat::{FitnessEvaluator, Genome, Parameters, Population, Settings};
use rulinalg::matrix::{BaseMatrix, Matrix};

const GRID: usize = 24;

/// GRID x GRID coordinates in [-0.5, 0.5]^2, one row per sample.
fn coordinate_grid() -> Matrix<f64> {
    let mut data = Vec::with_capacity(GRID * GRID * 2);
    for row in 0..GRID {
        for col in 0..GRID {
            data.push(col as f64 / (GRID - 1) as f64 - 0.5);
            data.push(row as f64 / (GRID - 1) as f64 - 0.5);
        }
    }
    Matrix::new(GRID * GRID, 2, data)
}

/// Target pattern: a ring around the origin.
fn ring_target(coords: &Matrix<f64>) -> Vec<f64> {
    (0..coords.rows())
        .map(|i| {
            let x = coords.data()[2 * i];
            let y = coords.data()[2 * i + 1];
            let radius = (x * x + y * y).sqrt();
            if (0.15..0.35).contains(&radius) {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

struct RingError {
    target: Vec<f64>,
    best: f64,
}

impl FitnessEvaluator for RingError {
    fn evaluate(
        &mut self,
        members: &[Genome],
        outputs: &HashMap<u64, Matrix<f64>>,
        _coords: &Matrix<f64>,
    ) -> Vec<f64> {
        let scores: Vec<f64> = members
            .iter()
            .map(|genome| {
                outputs[&genome.id]
                    .data()
                    .iter()
                    .zip(&self.target)
                    .map(|(got, want)| (got - want).powi(2))
                    .sum::<f64>()
                    / self.target.len() as f64
            })
            .collect();
        self.best = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        scores
    }
}

fn main() {
    env_logger::init();

    let settings = Settings {
        num_inputs: 2,
        num_hidden: 4,
        num_outputs: 1,
        population_size: 150,
        parameters: Parameters {
            // distances are normalized to [0, 1], cluster well below that
            compatibility_threshold: 0.4,
            ..Default::default()
        },
    };

    let coords = coordinate_grid();
    let mut evaluator = RingError {
        target: ring_target(&coords),
        best: f64::INFINITY,
    };
    let mut population = Population::new(&settings, 42);

    for generation in 0..400 {
        population
            .epoch(&mut evaluator, &coords)
            .expect("grid width matches the seed topology");
        if generation % 20 == 0 {
            println!("generation {:3}: best error {:.4}", generation, evaluator.best);
        }
        if evaluator.best < 0.01 {
            break;
        }
    }

    // score the final generation so the champion is meaningful
    let outputs = population
        .evaluate(&coords)
        .expect("grid width matches the seed topology");
    let scores = evaluator.evaluate(&population.members, &outputs, &coords);
    for (genome, score) in population.members.iter_mut().zip(scores) {
        genome.fitness = score;
    }

    let champion = population.champion();
    println!("champion genome {} with error {:.4}", champion.id, champion.fitness);
    println!("{}", champion.to_dot());
}
