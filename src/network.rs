//! Multilayer perceptron: a stack of dense hidden layers feeding a logistic output layer.
//!
//! The network only sequences work. Each batch goes through
//! shuffle → forward → backward → update, and the numerics live in the layers.
use std::fmt;
use std::ops::Range;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::dropout::MaskStore;
use crate::error::{Error, Result};
use crate::layers::{DenseLayer, LayerParameters};
use crate::logistic::LogisticLayer;
use crate::loss::one_hot;
use crate::metrics::accuracy;

/// Trained parameters of every layer, hidden layers first and the output layer last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub layers: Vec<LayerParameters>,
}

impl Parameters {
    /// `[inputs, hidden..., outputs]`
    pub fn topology(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.layers.first().map(|l| l.inputs()).into_iter().collect();
        sizes.extend(self.layers.iter().map(|l| l.outputs()));
        sizes
    }
}

/// Number of batches per epoch for `samples` samples.
///
/// `floor(samples / batch_size) - 1`, but never fewer than one; a batch size at
/// or above the sample count means a single batch over all data.
pub fn batch_count(samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 || batch_size >= samples {
        1
    } else {
        (samples / batch_size).saturating_sub(1).max(1)
    }
}

/// Row ranges of each batch in the shuffled order.
pub fn batch_ranges(samples: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.min(samples).max(1);
    (0..batch_count(samples, batch_size))
        .map(|i| i * size..((i + 1) * size).min(samples))
        .collect()
}

/// Network
#[derive(Debug)]
pub struct Network {
    hidden: Vec<DenseLayer>,
    output: LogisticLayer,
    config: NetworkConfig,
    masks: MaskStore,
    rng: StdRng,
    input_size: usize,
}

impl Network {
    /// Build a network with freshly initialised parameters.
    ///
    /// - `input_size`: number of input features
    /// - `hidden_sizes`: widths of the hidden layers, in order (may be empty)
    /// - `output_size`: number of classes
    /// - `config`: hyperparameters, including the seed every random draw derives from
    pub fn new(
        input_size: usize,
        hidden_sizes: &[usize],
        output_size: usize,
        config: NetworkConfig,
    ) -> Result<Self> {
        config.validate()?;
        if input_size == 0 || output_size == 0 || hidden_sizes.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "layer sizes must be positive: {} {:?} {}",
                input_size, hidden_sizes, output_size
            )));
        }
        let activations = config.hidden_activations(hidden_sizes.len())?;
        let output_activation = config.output_activation()?;
        let init = config.init_distribution()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut hidden = Vec::with_capacity(hidden_sizes.len());
        let mut prev_size = input_size;
        for (&size, &activation) in hidden_sizes.iter().zip(&activations) {
            hidden.push(DenseLayer::new(prev_size, size, activation, init, &mut rng)?);
            prev_size = size;
        }
        let output = LogisticLayer::new(prev_size, output_size, output_activation, init, &mut rng)?;

        Ok(Self {
            masks: MaskStore::new(hidden.len()),
            hidden,
            output,
            config,
            rng,
            input_size,
        })
    }

    /// Build a network around existing parameters; the topology is taken from them.
    pub fn with_parameters(parameters: &Parameters, config: NetworkConfig) -> Result<Self> {
        let sizes = parameters.topology();
        if sizes.len() < 2 {
            return Err(Error::shape("parameter layers", &[1], &[0]));
        }
        let mut network = Self::new(
            sizes[0],
            &sizes[1..sizes.len() - 1],
            sizes[sizes.len() - 1],
            config,
        )?;
        network.load_parameters(parameters)?;
        Ok(network)
    }

    /// One epoch: shuffle, then forward, backward and update every batch in turn.
    ///
    /// Returns the cost reported by each batch.
    pub fn train(&mut self, data: &Array2<f64>, labels: &[usize]) -> Result<Vec<f64>> {
        self.check_batch(data, labels)?;
        let targets = one_hot(labels, self.output_size())?;
        let samples = data.nrows();

        let mut order: Vec<usize> = (0..samples).collect();
        order.shuffle(&mut self.rng);

        if self.config.batch_size > samples {
            warn!(
                batch_size = self.config.batch_size,
                samples, "batch size exceeds sample count, training on one batch"
            );
        }
        let ranges = batch_ranges(samples, self.config.batch_size);
        debug!(
            batches = ranges.len(),
            batch_size = self.config.batch_size,
            dropout = self.config.dropout,
            "training epoch"
        );

        let mut costs = Vec::with_capacity(ranges.len());
        for (i, range) in ranges.into_iter().enumerate() {
            let rows = &order[range];
            let batch = data.select(Axis(0), rows);
            let batch_targets = targets.select(Axis(0), rows);

            let cost = self.forward_train(batch, batch_targets)?;
            self.back_prop_batch()?;
            self.update_batch()?;

            debug!(batch = i + 1, cost, "batch done");
            costs.push(cost);
        }
        Ok(costs)
    }

    /// Push a batch through every layer, masking hidden outputs when dropout is on.
    ///
    /// Returns the output layer's cost.
    pub fn feed_forward_batch(&mut self, data: &Array2<f64>, labels: &[usize]) -> Result<f64> {
        self.check_batch(data, labels)?;
        let targets = one_hot(labels, self.output_size())?;
        self.forward_train(data.to_owned(), targets)
    }

    fn forward_train(&mut self, data: Array2<f64>, targets: Array2<f64>) -> Result<f64> {
        self.masks.clear();
        let mut current = data;
        for (i, layer) in self.hidden.iter_mut().enumerate() {
            layer.feed_forward(current)?;
            if self.config.dropout {
                let mask =
                    layer.dropout_mask(layer.output().nrows(), self.config.dropout_rate, &mut self.rng)?;
                layer.mask_output(&mask)?;
                self.masks.insert(i, mask);
            }
            current = layer.output().clone();
        }
        self.output.feed_forward(current, targets)
    }

    /// Gradients from the output layer back to the first hidden layer.
    ///
    /// Each hidden layer is handed the cached input, gradient and weights of the
    /// layer after it, and has its gradient masked with the mask of this batch.
    pub fn back_prop_batch(&mut self) -> Result<()> {
        self.output.back_prop()?;
        for i in (0..self.hidden.len()).rev() {
            let (head, tail) = self.hidden.split_at_mut(i + 1);
            let upstream = match tail.first() {
                Some(next) => next.upstream(),
                None => self.output.upstream(),
            };
            let layer = &mut head[i];
            layer.back_prop(upstream)?;
            if let Some(mask) = self.masks.get(i) {
                layer.mask_gradient(mask)?;
            }
        }
        Ok(())
    }

    /// Apply the gradients computed by the last backward pass.
    pub fn update_batch(&mut self) -> Result<()> {
        let learning_rate = self.config.learning_rate;
        for layer in &mut self.hidden {
            layer.update(learning_rate)?;
        }
        self.output.update(learning_rate)
    }

    /// Output-layer scores for `x`.
    ///
    /// Hidden layers are evaluated with their affine output scaled by the keep
    /// probability instead of being masked. Parameters are never modified, so
    /// repeated calls agree.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let keep = self.config.keep_probability();
        let mut current = x.to_owned();
        for layer in &self.hidden {
            current = layer.predict(&current, keep)?;
        }
        self.output.predict(&current)
    }

    /// Fraction of samples whose arg-max prediction equals the label.
    pub fn test(&self, data: &Array2<f64>, labels: &[usize]) -> Result<f64> {
        self.check_batch(data, labels)?;
        let scores = self.predict(data)?;
        let acc = accuracy(&scores, labels)?;
        info!(samples = labels.len(), accuracy = acc, "evaluated");
        Ok(acc)
    }

    fn check_batch(&self, data: &Array2<f64>, labels: &[usize]) -> Result<()> {
        if data.nrows() == 0 {
            return Err(Error::EmptyDataset);
        }
        if data.ncols() != self.input_size {
            return Err(Error::shape(
                "network input",
                &[data.nrows(), self.input_size],
                data.shape(),
            ));
        }
        if labels.len() != data.nrows() {
            return Err(Error::shape("labels", &[data.nrows()], &[labels.len()]));
        }
        Ok(())
    }

    /// Snapshot of every layer's parameters.
    pub fn parameters(&self) -> Parameters {
        let mut layers: Vec<LayerParameters> =
            self.hidden.iter().map(|l| l.parameters().clone()).collect();
        layers.push(self.output.parameters().clone());
        Parameters { layers }
    }

    /// Replace every layer's parameters. Nothing is changed unless all shapes match.
    pub fn load_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        let expected = self.parameters();
        if parameters.layers.len() != expected.layers.len() {
            return Err(Error::shape(
                "parameter layers",
                &[expected.layers.len()],
                &[parameters.layers.len()],
            ));
        }
        for (want, got) in expected.layers.iter().zip(&parameters.layers) {
            if want.weights.shape() != got.weights.shape() || want.bias.shape() != got.bias.shape() {
                return Err(Error::shape("layer parameters", want.weights.shape(), got.weights.shape()));
            }
        }
        let (last, hidden) = parameters
            .layers
            .split_last()
            .ok_or_else(|| Error::shape("parameter layers", &[1], &[0]))?;
        for (layer, params) in self.hidden.iter_mut().zip(hidden) {
            layer.set_parameters(params.clone())?;
        }
        self.output.set_parameters(last.clone())
    }

    /// `[inputs, hidden..., outputs]`
    pub fn topology(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_size];
        sizes.extend(self.hidden.iter().map(|l| l.outputs()));
        sizes.push(self.output.outputs());
        sizes
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output.outputs()
    }

    pub fn hidden_layers(&self) -> &[DenseLayer] {
        &self.hidden
    }

    pub fn output_layer(&self) -> &LogisticLayer {
        &self.output
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Dropout masks of the batch currently in flight.
    pub fn masks(&self) -> &MaskStore {
        &self.masks
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let activations: Vec<&str> = self.hidden.iter().map(|l| l.activation().name()).collect();
        write!(
            f,
            "Network: {:?} hidden={:?} output={} dropout={}",
            self.topology(),
            activations,
            self.output.activation(),
            if self.config.dropout {
                format!("{}", self.config.dropout_rate)
            } else {
                "off".to_string()
            }
        )
    }
}
