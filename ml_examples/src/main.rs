// ml_examples/src/main.rs
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use dropout_mlp::{print_model_summary, print_summary_table, Network, NetworkConfig, Parameters};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing_subscriber::EnvFilter;

/// Save trained parameters as gzipped JSON (.pere).
fn save_pere(parameters: &Parameters, path: &str) -> Result<()> {
    let json = serde_json::to_vec(parameters)?;
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path))?;
    let mut enc = GzEncoder::new(file, Compression::default());
    enc.write_all(&json)?;
    enc.finish()?;
    Ok(())
}

/// Load parameters saved by `save_pere`.
fn load_pere(path: &str) -> Result<Parameters> {
    let file = File::open(path).with_context(|| format!("opening {}", path))?;
    let mut dec = GzDecoder::new(file);
    let mut buf = Vec::new();
    dec.read_to_end(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Train for `epochs`, recording the mean batch cost of each.
fn run_epochs(
    network: &mut Network,
    x: &ndarray::Array2<f64>,
    y: &[usize],
    epochs: usize,
) -> Result<Vec<f64>> {
    tracing::info!(
        epochs,
        batch_size = network.config().batch_size,
        dropout = network.config().dropout,
        "training run"
    );
    let mut losses = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let costs = network.train(x, y)?;
        let avg = costs.iter().sum::<f64>() / costs.len() as f64;
        if epoch % (epochs / 10).max(1) == 0 {
            tracing::info!(epoch = epoch + 1, cost = avg, "epoch done");
        }
        losses.push(avg);
    }
    Ok(losses)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    #[cfg(feature = "xor")]
    {
        println!("=== XOR ===");
        let (x, y) = dropout_mlp::datasets::xor();
        let config = NetworkConfig::default()
            .with_batch_size(4)
            .with_learning_rate(0.1)
            .with_hidden_activation(dropout_mlp::ActivationKind::Tanh)
            .with_output_activation(dropout_mlp::ActivationKind::Softmax)
            .with_dropout(0.1)
            .with_seed(123);
        let mut network = Network::new(2, &[10, 10], 2, config.clone())?;
        print_model_summary(&network);
        let losses = run_epochs(&mut network, &x, &y, 3000)?;
        print_summary_table(&losses, "Training Loss");
        let acc = network.test(&x, &y)?;
        println!("XOR Accuracy: {:.2}%", acc * 100.0);

        save_pere(&network.parameters(), "models/xor_model.pere")?;
        let reloaded = Network::with_parameters(&load_pere("models/xor_model.pere")?, config)?;
        println!("XOR Accuracy (reloaded): {:.2}%", reloaded.test(&x, &y)? * 100.0);
    }

    #[cfg(feature = "mnist")]
    {
        println!("\n=== MNIST ===");
        let dir = std::env::var("MNIST_DIR").unwrap_or_else(|_| "MNIST".to_string());
        let (train_x, train_y) = dropout_mlp::datasets::load_mnist(&dir, true)
            .with_context(|| format!("loading MNIST training split from {}", dir))?;
        let (test_x, test_y) = dropout_mlp::datasets::load_mnist(&dir, false)
            .with_context(|| format!("loading MNIST test split from {}", dir))?;
        let train_x = dropout_mlp::datasets::normalize_by_max(&train_x);
        let test_x = dropout_mlp::datasets::normalize_by_max(&test_x);

        let config = match std::env::var("MLP_CONFIG") {
            Ok(path) => NetworkConfig::from_json_file(&path)
                .with_context(|| format!("reading config {}", path))?,
            Err(_) => NetworkConfig::default()
                .with_batch_size(100)
                .with_learning_rate(0.01)
                .with_init(0.0, 0.1)
                .with_dropout(0.2),
        };
        let mut network = Network::new(784, &[128, 64], 10, config.clone())?;
        print_model_summary(&network);
        let losses = run_epochs(&mut network, &train_x, &train_y, 10)?;
        print_summary_table(&losses, "Training Loss");
        let acc = network.test(&test_x, &test_y)?;
        println!("MNIST Test Accuracy: {:.2}%", acc * 100.0);

        let cm = dropout_mlp::confusion_matrix(&network.predict(&test_x)?, &test_y, 10)?;
        for (digit, row) in cm.iter().enumerate() {
            println!("{}: {:?}", digit, row);
        }

        save_pere(&network.parameters(), "models/mnist_model.pere")?;
        let reloaded = Network::with_parameters(&load_pere("models/mnist_model.pere")?, config)?;
        println!(
            "MNIST Test Accuracy (reloaded): {:.2}%",
            reloaded.test(&test_x, &test_y)? * 100.0
        );
    }

    Ok(())
}
