//! Training hyperparameters.
use std::fs;
use std::path::Path;

use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::activations::ActivationKind;
use crate::error::{Error, Result};

/// Hyperparameters handed to [`crate::Network::new`].
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use dropout_mlp::NetworkConfig;
/// let config = NetworkConfig::from_json_str(r#"{ "learning_rate": 0.05, "hidden_activation": "tanh" }"#)?;
/// assert_eq!(config.batch_size, 32);
/// # Ok::<(), dropout_mlp::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Mask hidden units during training.
    pub dropout: bool,
    /// Probability of dropping a unit.
    pub dropout_rate: f64,
    pub seed: u64,
    /// Mean of the normal distribution parameters are drawn from.
    pub mu: f64,
    /// Standard deviation of the same distribution.
    pub sigma: f64,
    pub hidden_activation: String,
    /// Per-hidden-layer activation names, overriding `hidden_activation`.
    pub layer_activations: Option<Vec<String>>,
    pub output_activation: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            batch_size: 32,
            dropout: false,
            dropout_rate: 0.5,
            seed: 1234,
            mu: 0.0,
            sigma: 1.0,
            hidden_activation: "sigmoid".to_string(),
            layer_activations: None,
            output_activation: "sigmoid".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Check every range; activation names are checked by [`Self::hidden_activations`].
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(Error::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        self.init_distribution()?;
        Ok(())
    }

    /// Probability that a hidden unit survives dropout; 1 when dropout is off.
    pub fn keep_probability(&self) -> f64 {
        if self.dropout {
            1.0 - self.dropout_rate
        } else {
            1.0
        }
    }

    pub fn init_distribution(&self) -> Result<Normal<f64>> {
        Normal::new(self.mu, self.sigma).map_err(|e| {
            Error::InvalidConfig(format!("mu {} / sigma {}: {}", self.mu, self.sigma, e))
        })
    }

    /// Resolve the activation of each of `layers` hidden layers.
    pub fn hidden_activations(&self, layers: usize) -> Result<Vec<ActivationKind>> {
        match &self.layer_activations {
            Some(names) => {
                if names.len() != layers {
                    return Err(Error::InvalidConfig(format!(
                        "{} layer activations for {} hidden layers",
                        names.len(),
                        layers
                    )));
                }
                names.iter().map(|name| name.parse()).collect()
            }
            None => {
                let kind: ActivationKind = self.hidden_activation.parse()?;
                Ok(vec![kind; layers])
            }
        }
    }

    pub fn output_activation(&self) -> Result<ActivationKind> {
        self.output_activation.parse()
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable dropout with the given drop probability.
    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout = true;
        self.dropout_rate = rate;
        self
    }

    pub fn without_dropout(mut self) -> Self {
        self.dropout = false;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_init(mut self, mu: f64, sigma: f64) -> Self {
        self.mu = mu;
        self.sigma = sigma;
        self
    }

    pub fn with_hidden_activation(mut self, activation: ActivationKind) -> Self {
        self.hidden_activation = activation.to_string();
        self.layer_activations = None;
        self
    }

    pub fn with_layer_activations(mut self, activations: &[ActivationKind]) -> Self {
        self.layer_activations = Some(activations.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn with_output_activation(mut self, activation: ActivationKind) -> Self {
        self.output_activation = activation.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        NetworkConfig::default().validate().unwrap();
        assert_eq!(NetworkConfig::default().keep_probability(), 1.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            NetworkConfig::from_json_str(r#"{"dropout": true, "dropout_rate": 0.2, "seed": 7}"#)
                .unwrap();
        assert!(config.dropout);
        assert_eq!(config.seed, 7);
        assert_eq!(config.batch_size, 32);
        assert!((config.keep_probability() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for json in [
            r#"{"learning_rate": 0.0}"#,
            r#"{"learning_rate": -1.0}"#,
            r#"{"batch_size": 0}"#,
            r#"{"dropout_rate": 1.0}"#,
            r#"{"sigma": -1.0}"#,
        ] {
            assert!(
                matches!(NetworkConfig::from_json_str(json), Err(Error::InvalidConfig(_))),
                "{}",
                json
            );
        }
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            NetworkConfig::from_json_str("{ not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn activations_resolve_per_layer() {
        let config = NetworkConfig::default()
            .with_layer_activations(&[ActivationKind::Tanh, ActivationKind::ReLU]);
        assert_eq!(
            config.hidden_activations(2).unwrap(),
            vec![ActivationKind::Tanh, ActivationKind::ReLU]
        );
        assert!(config.hidden_activations(3).is_err());

        let uniform = NetworkConfig::default().with_hidden_activation(ActivationKind::ReLU);
        assert_eq!(uniform.hidden_activations(3).unwrap(), vec![ActivationKind::ReLU; 3]);
    }

    #[test]
    fn unknown_activation_name_fails() {
        let config = NetworkConfig {
            hidden_activation: "gelu".into(),
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.hidden_activations(1),
            Err(Error::UnsupportedActivation(_))
        ));
    }
}
