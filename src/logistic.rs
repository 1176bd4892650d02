//! Output layer: logistic (sigmoid) or softmax regression with a cross-entropy cost.
//!
//! The layer seeds the backward pass with `targets - output`, which is the
//! exact logit gradient for both pairings.
use ndarray::Array2;
use rand::Rng;
use rand_distr::Normal;

use crate::activations::ActivationKind;
use crate::error::{Error, Result};
use crate::layers::{affine, apply_update, LayerParameters, Upstream};
use crate::loss::{cross_entropy, cross_entropy_delta};

/// Terminal layer of the network.
#[derive(Debug, Clone)]
pub struct LogisticLayer {
    params: LayerParameters,
    activation: ActivationKind,
    input: Array2<f64>,
    targets: Array2<f64>,
    output: Array2<f64>,
    gradient: Array2<f64>,
}

impl LogisticLayer {
    /// Fails with `UnsupportedActivation` unless `activation` is sigmoid or softmax.
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        activation: ActivationKind,
        init: Normal<f64>,
        rng: &mut R,
    ) -> Result<Self> {
        Self::from_parameters(
            LayerParameters::sample(inputs, outputs, init, rng),
            activation,
        )
    }

    pub fn from_parameters(params: LayerParameters, activation: ActivationKind) -> Result<Self> {
        if !activation.supports_output() {
            return Err(Error::UnsupportedActivation(format!(
                "{} cannot be paired with cross-entropy",
                activation
            )));
        }
        params.check()?;
        let (inputs, outputs) = (params.inputs(), params.outputs());
        Ok(Self {
            params,
            activation,
            input: Array2::zeros((0, inputs)),
            targets: Array2::zeros((0, outputs)),
            output: Array2::zeros((0, outputs)),
            gradient: Array2::zeros((0, outputs)),
        })
    }

    /// Forward pass over `input`, caching it along with `targets`; returns the cost.
    pub fn feed_forward(&mut self, input: Array2<f64>, targets: Array2<f64>) -> Result<f64> {
        if targets.dim() != (input.nrows(), self.outputs()) {
            return Err(Error::shape(
                "targets",
                &[input.nrows(), self.outputs()],
                targets.shape(),
            ));
        }
        self.output = self.activation.apply(&affine(&input, &self.params)?);
        self.input = input;
        self.targets = targets;
        self.cost()
    }

    /// Cross-entropy of the cached output against the cached targets.
    pub fn cost(&self) -> Result<f64> {
        cross_entropy(&self.output, &self.targets, self.activation)
    }

    /// Seed the backward pass.
    pub fn back_prop(&mut self) -> Result<()> {
        self.gradient = cross_entropy_delta(&self.output, &self.targets)?;
        Ok(())
    }

    pub fn update(&mut self, learning_rate: f64) -> Result<()> {
        apply_update(&mut self.params, &self.input, &self.gradient, learning_rate)
    }

    /// Class scores for `input`, without touching any cached state.
    pub fn predict(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.activation.apply(&affine(input, &self.params)?))
    }

    pub fn upstream(&self) -> Upstream<'_> {
        Upstream {
            input: self.input.view(),
            gradient: self.gradient.view(),
            weights: self.params.weights.view(),
        }
    }

    pub fn inputs(&self) -> usize {
        self.params.inputs()
    }

    pub fn outputs(&self) -> usize {
        self.params.outputs()
    }

    pub fn activation(&self) -> ActivationKind {
        self.activation
    }

    pub fn parameters(&self) -> &LayerParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: LayerParameters) -> Result<()> {
        params.check()?;
        if params.weights.shape() != self.params.weights.shape() {
            return Err(Error::shape(
                "output weights",
                self.params.weights.shape(),
                params.weights.shape(),
            ));
        }
        self.params = params;
        Ok(())
    }

    pub fn input(&self) -> &Array2<f64> {
        &self.input
    }

    pub fn output(&self) -> &Array2<f64> {
        &self.output
    }

    pub fn gradient(&self) -> &Array2<f64> {
        &self.gradient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn head(activation: ActivationKind) -> LogisticLayer {
        let params = LayerParameters {
            weights: array![[1.0, -1.0], [0.5, 0.5]],
            bias: array![0.0, 0.1],
        };
        LogisticLayer::from_parameters(params, activation).unwrap()
    }

    #[test]
    fn rejects_hidden_only_activations() {
        let params = LayerParameters {
            weights: Array2::zeros((2, 2)),
            bias: Array1::zeros(2),
        };
        assert!(matches!(
            LogisticLayer::from_parameters(params, ActivationKind::ReLU),
            Err(Error::UnsupportedActivation(_))
        ));
    }

    #[test]
    fn softmax_outputs_sum_to_one() {
        let mut h = head(ActivationKind::Softmax);
        let cost = h
            .feed_forward(array![[1.0, 2.0], [0.0, -1.0]], array![[1.0, 0.0], [0.0, 1.0]])
            .unwrap();
        assert!(cost.is_finite() && cost > 0.0);
        for row in h.output().rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(h.cost().unwrap(), cost);
    }

    #[test]
    fn back_prop_seeds_targets_minus_output() {
        let mut h = head(ActivationKind::Sigmoid);
        let targets = array![[0.0, 1.0]];
        h.feed_forward(array![[0.2, 0.4]], targets.clone()).unwrap();
        h.back_prop().unwrap();
        let expected = &targets - h.output();
        assert_abs_diff_eq!(*h.gradient(), expected, epsilon = 1e-15);
    }

    #[test]
    fn saturated_output_keeps_cost_finite() {
        let params = LayerParameters {
            weights: array![[1000.0, -1000.0]],
            bias: array![0.0, 0.0],
        };
        for kind in [ActivationKind::Sigmoid, ActivationKind::Softmax] {
            let mut h = LogisticLayer::from_parameters(params.clone(), kind).unwrap();
            let cost = h.feed_forward(array![[1.0]], array![[0.0, 1.0]]).unwrap();
            assert!(cost.is_finite(), "{} cost {}", kind, cost);
        }
    }

    #[test]
    fn predict_matches_forward_without_caching() {
        let mut h = head(ActivationKind::Sigmoid);
        let x = array![[0.3, -0.6]];
        let scores = h.predict(&x).unwrap();
        assert_eq!(h.input().nrows(), 0);
        h.feed_forward(x, array![[1.0, 0.0]]).unwrap();
        assert_eq!(&scores, h.output());
    }

    #[test]
    fn target_shape_is_checked() {
        let mut h = head(ActivationKind::Sigmoid);
        assert!(matches!(
            h.feed_forward(array![[1.0, 1.0]], array![[1.0, 0.0, 0.0]]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn one_step_lowers_the_cost() {
        let mut h = head(ActivationKind::Softmax);
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let t = array![[0.0, 1.0], [1.0, 0.0]];
        let before = h.feed_forward(x.clone(), t.clone()).unwrap();
        h.back_prop().unwrap();
        h.update(0.1).unwrap();
        let after = h.feed_forward(x, t).unwrap();
        assert!(after < before, "{} !< {}", after, before);
    }
}
