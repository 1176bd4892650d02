//! Error types shared by every module of the crate.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building, training or evaluating a network.
///
/// All of these are configuration or programmer errors detected synchronously;
/// nothing in the crate retries.
#[derive(Error, Debug)]
pub enum Error {
    /// Two tensors that must line up do not
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Activation name not known, or not allowed for this kind of layer
    #[error("unsupported activation: {0}")]
    UnsupportedActivation(String),

    /// Hyperparameter outside its valid range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Training or evaluation was asked to run on zero samples
    #[error("dataset is empty")]
    EmptyDataset,

    /// Class index that does not fit the output layer
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    /// Malformed on-disk dataset
    #[error("dataset error: {0}")]
    Dataset(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn shape(context: &'static str, expected: &[usize], found: &[usize]) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
