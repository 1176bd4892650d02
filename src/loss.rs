//! Cross-entropy cost for the output layer.
use ndarray::Array2;

use crate::activations::ActivationKind;
use crate::error::{Error, Result};

/// Probabilities are clamped to `[EPSILON, 1 - EPSILON]` before taking logs.
pub const EPSILON: f64 = 1e-12;

fn clamp(p: f64) -> f64 {
    if !p.is_finite() || p < EPSILON {
        EPSILON
    } else if p > 1.0 - EPSILON {
        1.0 - EPSILON
    } else {
        p
    }
}

/// One-hot encode class indices into a `(labels, classes)` target matrix.
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Array2<f64>> {
    let mut targets = Array2::zeros((labels.len(), classes));
    for (row, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(Error::LabelOutOfRange { label, classes });
        }
        targets[[row, label]] = 1.0;
    }
    Ok(targets)
}

/// Cross-entropy between `output` probabilities and `targets`, averaged over the batch.
///
/// Sigmoid outputs are scored unit by unit (binary cross-entropy summed over
/// units); softmax outputs use the categorical form.
pub fn cross_entropy(
    output: &Array2<f64>,
    targets: &Array2<f64>,
    activation: ActivationKind,
) -> Result<f64> {
    if output.shape() != targets.shape() {
        return Err(Error::shape("cross-entropy", targets.shape(), output.shape()));
    }
    let rows = output.nrows();
    if rows == 0 {
        return Err(Error::EmptyDataset);
    }
    let total: f64 = match activation {
        ActivationKind::Sigmoid => output
            .iter()
            .zip(targets)
            .map(|(&p, &t)| {
                let p = clamp(p);
                -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
            })
            .sum(),
        ActivationKind::Softmax => output
            .iter()
            .zip(targets)
            .map(|(&p, &t)| -t * clamp(p).ln())
            .sum(),
        other => return Err(Error::UnsupportedActivation(other.to_string())),
    };
    Ok(total / rows as f64)
}

/// Error signal at the logits for a matched sigmoid/softmax + cross-entropy pair.
///
/// Signed as `targets - output`, the negative gradient, so adding it to the
/// parameters descends the cost.
pub fn cross_entropy_delta(output: &Array2<f64>, targets: &Array2<f64>) -> Result<Array2<f64>> {
    if output.shape() != targets.shape() {
        return Err(Error::shape("cross-entropy delta", targets.shape(), output.shape()));
    }
    Ok(targets - output)
}
