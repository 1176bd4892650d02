//! Activation functions and their derivatives.
//!
//! Derivatives take the activation *output* rather than its input, which is
//! what the backward pass has on hand: the cached input of the next layer.
use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sigmoid: 1 / (1 + exp(-x)), split on the sign of `x` so `exp` never overflows.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Sigmoid derivative in terms of `y = sigmoid(x)`.
pub fn sigmoid_prime(y: f64) -> f64 {
    y * (1.0 - y)
}

/// Tanh: (exp(x) - exp(-x)) / (exp(x) + exp(-x))
pub fn tanh(x: f64) -> f64 {
    x.tanh()
}

/// Tanh derivative in terms of `y = tanh(x)`.
pub fn tanh_prime(y: f64) -> f64 {
    1.0 - y * y
}

/// ReLU: max(0, x)
pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// ReLU derivative in terms of `y = relu(x)`.
pub fn relu_prime(y: f64) -> f64 {
    (y > 0.0) as u8 as f64
}

/// Row-wise softmax, one distribution per sample.
pub fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    let width = out.ncols();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if !sum.is_finite() || sum <= 0.0 {
            // uniform fallback instead of NaN
            row.fill(1.0 / width as f64);
        } else {
            row /= sum;
        }
    }
    out
}

/// Activation identifiers understood by the layers.
///
/// Hidden layers accept `sigmoid`, `tanh` and `relu`; the output layer accepts
/// `sigmoid` and `softmax`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    Sigmoid,
    Tanh,
    ReLU,
    Softmax,
}

impl ActivationKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::Tanh => "tanh",
            ActivationKind::ReLU => "relu",
            ActivationKind::Softmax => "softmax",
        }
    }

    /// Whether a dense hidden layer may use this activation.
    pub fn supports_hidden(&self) -> bool {
        matches!(
            self,
            ActivationKind::Sigmoid | ActivationKind::Tanh | ActivationKind::ReLU
        )
    }

    /// Whether the activation pairs with a cross-entropy cost on the output layer.
    pub fn supports_output(&self) -> bool {
        matches!(self, ActivationKind::Sigmoid | ActivationKind::Softmax)
    }

    /// Apply the activation to a batch of pre-activations.
    pub fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            ActivationKind::Sigmoid => z.mapv(sigmoid),
            ActivationKind::Tanh => z.mapv(tanh),
            ActivationKind::ReLU => z.mapv(relu),
            ActivationKind::Softmax => softmax_rows(z),
        }
    }

    /// Elementwise derivative evaluated at activation outputs `y`.
    ///
    /// For softmax this is the diagonal of the Jacobian only.
    pub fn derivative(&self, y: &Array2<f64>) -> Array2<f64> {
        match self {
            ActivationKind::Sigmoid | ActivationKind::Softmax => y.mapv(sigmoid_prime),
            ActivationKind::Tanh => y.mapv(tanh_prime),
            ActivationKind::ReLU => y.mapv(relu_prime),
        }
    }
}

impl Default for ActivationKind {
    fn default() -> Self {
        ActivationKind::Sigmoid
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActivationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sigmoid" | "logistic" => Ok(ActivationKind::Sigmoid),
            "tanh" => Ok(ActivationKind::Tanh),
            "relu" => Ok(ActivationKind::ReLU),
            "softmax" => Ok(ActivationKind::Softmax),
            _ => Err(Error::UnsupportedActivation(s.to_string())),
        }
    }
}
