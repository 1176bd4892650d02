//! A minimal multilayer perceptron trained by mini-batch gradient descent,
//! with optional dropout on the hidden layers.
//!
//! - Dense hidden layers (sigmoid, tanh, relu) feeding a sigmoid or softmax output layer
//! - Cross-entropy cost with hand-derived gradients
//! - Dropout masks shared by the forward and backward pass of a batch,
//!   keep-probability scaling at inference
//! - IDX (MNIST) loader and the XOR toy set for driving the network
//!
//! ```
//! use dropout_mlp::{datasets, Network, NetworkConfig};
//!
//! let (x, y) = datasets::xor();
//! let config = NetworkConfig::default().with_batch_size(4).with_learning_rate(0.5);
//! let mut network = Network::new(2, &[10, 10], 2, config)?;
//! for _ in 0..10 {
//!     network.train(&x, &y)?;
//! }
//! let accuracy = network.test(&x, &y)?;
//! assert!((0.0..=1.0).contains(&accuracy));
//! # Ok::<(), dropout_mlp::Error>(())
//! ```

pub mod activations;
pub mod config;
pub mod datasets;
pub mod dropout;
pub mod error;
pub mod layers;
pub mod logistic;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod utils;

pub use activations::ActivationKind;
pub use config::NetworkConfig;
pub use error::{Error, Result};
pub use layers::{DenseLayer, LayerParameters, Upstream};
pub use logistic::LogisticLayer;
pub use loss::{cross_entropy, cross_entropy_delta, one_hot};
pub use metrics::{accuracy, argmax_rows, confusion_matrix};
pub use network::{batch_count, batch_ranges, Network, Parameters};
pub use utils::{generate_synthetic_data, print_model_summary, print_summary_table};
