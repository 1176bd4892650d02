//! Utility functions for driving and reporting training runs.
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::datasets::Dataset;
use crate::network::Network;

/// Random features in `[-1, 1)` labelled by which of `classes` equal slices
/// their mean falls into, so the classes are linearly separable.
pub fn generate_synthetic_data(
    n_samples: usize,
    input_size: usize,
    classes: usize,
    seed: u64,
) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = Array2::from_shape_simple_fn((n_samples, input_size), || rng.gen_range(-1.0..1.0));
    let classes = classes.max(1);
    let labels = data
        .rows()
        .into_iter()
        .map(|row| {
            let position = (row.mean().unwrap_or(0.0) + 1.0) / 2.0;
            ((position * classes as f64) as usize).min(classes - 1)
        })
        .collect();
    (data, labels)
}

/// Print model summary
pub fn print_model_summary(network: &Network) {
    println!("Model Summary:\n{}", network);
}

/// Print a table of per-epoch values with their average.
pub fn print_summary_table(values: &[f64], title: &str) {
    println!("\n{} Summary Table:", title);
    println!("+---------------+------------+");
    println!("| Epoch         |      Value |");
    println!("+---------------+------------+");
    let step = (values.len() / 10).max(1);
    for (i, v) in values.iter().enumerate() {
        if i % step == 0 || i + 1 == values.len() {
            println!("| {:<13} | {:>10.6} |", i + 1, v);
        }
    }
    if !values.is_empty() {
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        println!("+---------------+------------+");
        println!("| All Epochs    | {:>10.6} |", avg);
    }
    println!("+---------------+------------+");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_data_is_reproducible_and_labelled() {
        let (x, y) = generate_synthetic_data(50, 3, 2, 9);
        let (x2, y2) = generate_synthetic_data(50, 3, 2, 9);
        assert_eq!(x, x2);
        assert_eq!(y, y2);
        assert_eq!(x.dim(), (50, 3));
        for (row, &label) in x.rows().into_iter().zip(&y) {
            assert_eq!(label, usize::from(row.mean().unwrap() >= 0.0));
        }
    }
}
