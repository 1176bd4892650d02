//! Dense hidden layer: affine transform followed by an activation.
//!
//! Every layer caches the input and output of its latest forward pass and the
//! gradient buffer of its latest backward pass. Those caches live for one
//! forward/backward/update cycle and are overwritten by the next batch.
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::activations::ActivationKind;
use crate::dropout;
use crate::error::{Error, Result};

/// Weight matrix `(inputs, outputs)` and bias `(outputs,)` of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParameters {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LayerParameters {
    /// Draw both tensors from `init`.
    pub fn sample<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        init: Normal<f64>,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: Array2::random_using((inputs, outputs), init, rng),
            bias: Array1::random_using(outputs, init, rng),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.bias.len() != self.outputs() {
            return Err(Error::shape("bias", &[self.outputs()], self.bias.shape()));
        }
        Ok(())
    }
}

/// What the next layer towards the output hands down during the backward pass:
/// its cached input, its gradient buffer and its weight matrix.
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub input: ArrayView2<'a, f64>,
    pub gradient: ArrayView2<'a, f64>,
    pub weights: ArrayView2<'a, f64>,
}

/// `x · W + b`
pub(crate) fn affine(input: &Array2<f64>, params: &LayerParameters) -> Result<Array2<f64>> {
    if input.ncols() != params.inputs() {
        return Err(Error::shape(
            "layer input",
            &[input.nrows(), params.inputs()],
            input.shape(),
        ));
    }
    Ok(input.dot(&params.weights) + &params.bias)
}

/// `W += η · xᵀ · δ` and `b += η · mean(δ)`; `δ` carries the descent sign already.
pub(crate) fn apply_update(
    params: &mut LayerParameters,
    input: &Array2<f64>,
    gradient: &Array2<f64>,
    learning_rate: f64,
) -> Result<()> {
    if gradient.nrows() != input.nrows() || gradient.ncols() != params.outputs() {
        return Err(Error::shape(
            "gradient buffer",
            &[input.nrows(), params.outputs()],
            gradient.shape(),
        ));
    }
    let Some(mean) = gradient.mean_axis(Axis(0)) else {
        // nothing cached yet
        return Ok(());
    };
    params
        .weights
        .scaled_add(learning_rate, &input.t().dot(gradient));
    params.bias.scaled_add(learning_rate, &mean);
    Ok(())
}

/// A fully-connected hidden layer.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    params: LayerParameters,
    activation: ActivationKind,
    input: Array2<f64>,
    output: Array2<f64>,
    gradient: Array2<f64>,
}

impl DenseLayer {
    /// Create a layer with parameters drawn from `init`.
    ///
    /// Fails with `UnsupportedActivation` unless `activation` is sigmoid, tanh or relu.
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

    /// Wrap existing parameters.
    pub fn from_parameters(params: LayerParameters, activation: ActivationKind) -> Result<Self> {
        if !activation.supports_hidden() {
            return Err(Error::UnsupportedActivation(format!(
                "{} is not a hidden-layer activation",
                activation
            )));
        }
        params.check()?;
        let (inputs, outputs) = (params.inputs(), params.outputs());
        Ok(Self {
            params,
            activation,
            input: Array2::zeros((0, inputs)),
            output: Array2::zeros((0, outputs)),
            gradient: Array2::zeros((0, outputs)),
        })
    }

    /// Forward pass: caches `input`, computes and caches `activation(input · W + b)`.
    pub fn feed_forward(&mut self, input: Array2<f64>) -> Result<&Array2<f64>> {
        let output = self.activation.apply(&affine(&input, &self.params)?);
        self.input = input;
        self.output = output;
        Ok(&self.output)
    }

    /// Forward pass over the input cached by the previous call.
    pub fn refeed(&mut self) -> Result<&Array2<f64>> {
        self.output = self.activation.apply(&affine(&self.input, &self.params)?);
        Ok(&self.output)
    }

    /// Inference pass with the affine output scaled by `scale` before the
    /// activation. Leaves parameters and caches untouched.
    pub fn predict(&self, input: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
        let z = affine(input, &self.params)? * scale;
        Ok(self.activation.apply(&z))
    }

    /// Chain-rule step: `δ = f′(next.input) ⊙ (next.δ · next.Wᵀ)`.
    ///
    /// The derivative is taken at the next layer's cached input, which is this
    /// layer's (possibly masked) output.
    pub fn back_prop(&mut self, upstream: Upstream<'_>) -> Result<()> {
        if upstream.weights.nrows() != self.outputs() {
            return Err(Error::shape(
                "upstream weights",
                &[self.outputs(), upstream.weights.ncols()],
                upstream.weights.shape(),
            ));
        }
        let propagated = upstream.gradient.dot(&upstream.weights.t());
        if upstream.input.shape() != propagated.shape() {
            return Err(Error::shape(
                "upstream input",
                propagated.shape(),
                upstream.input.shape(),
            ));
        }
        let slope = self.activation.derivative(&upstream.input.to_owned());
        self.gradient = slope * propagated;
        Ok(())
    }

    /// Gradient-descent step with the cached input and gradient buffer.
    pub fn update(&mut self, learning_rate: f64) -> Result<()> {
        apply_update(&mut self.params, &self.input, &self.gradient, learning_rate)
    }

    /// Fresh Bernoulli(1 - `rate`) mask shaped like this layer's output for `batch` rows.
    pub fn dropout_mask<R: Rng + ?Sized>(
        &self,
        batch: usize,
        rate: f64,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        dropout::bernoulli_mask((batch, self.outputs()), rate, rng)
    }

    /// Multiply a dropout mask into the cached output.
    pub fn mask_output(&mut self, mask: &Array2<f64>) -> Result<()> {
        dropout::apply_mask(&mut self.output, mask)
    }

    /// Multiply a dropout mask into the gradient buffer.
    pub fn mask_gradient(&mut self, mask: &Array2<f64>) -> Result<()> {
        dropout::apply_mask(&mut self.gradient, mask)
    }

    /// The view the previous layer needs for its own backward step.
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

    /// Replace the parameters, keeping the layer's shape.
    pub fn set_parameters(&mut self, params: LayerParameters) -> Result<()> {
        params.check()?;
        if params.weights.shape() != self.params.weights.shape() {
            return Err(Error::shape(
                "hidden weights",
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
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(activation: ActivationKind) -> DenseLayer {
        let params = LayerParameters {
            weights: array![[0.5, -1.0], [0.25, 2.0]],
            bias: array![0.1, -0.2],
        };
        DenseLayer::from_parameters(params, activation).unwrap()
    }

    #[test]
    fn new_layer_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(1234);
        let init = Normal::new(0.0, 1.0).unwrap();
        let l = DenseLayer::new(3, 5, ActivationKind::Tanh, init, &mut rng).unwrap();
        assert_eq!(l.parameters().weights.dim(), (3, 5));
        assert_eq!(l.parameters().bias.len(), 5);
        assert_eq!((l.inputs(), l.outputs()), (3, 5));
    }

    #[test]
    fn softmax_hidden_layer_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let init = Normal::new(0.0, 1.0).unwrap();
        assert!(matches!(
            DenseLayer::new(2, 2, ActivationKind::Softmax, init, &mut rng),
            Err(Error::UnsupportedActivation(_))
        ));
    }

    #[test]
    fn feed_forward_computes_affine_then_activation() {
        let mut l = layer(ActivationKind::ReLU);
        let out = l.feed_forward(array![[1.0, 1.0], [2.0, 0.0]]).unwrap().clone();
        // z = [[0.85, 0.8], [1.1, -2.2]]
        assert_abs_diff_eq!(out, array![[0.85, 0.8], [1.1, 0.0]], epsilon = 1e-12);
        assert_eq!(l.input(), &array![[1.0, 1.0], [2.0, 0.0]]);
    }

    #[test]
    fn feed_forward_is_deterministic() {
        let mut l = layer(ActivationKind::Sigmoid);
        let x = array![[0.3, -0.7], [1.5, 0.2]];
        let first = l.feed_forward(x.clone()).unwrap().clone();
        let second = l.feed_forward(x).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(l.refeed().unwrap(), &first);
    }

    #[test]
    fn wrong_input_width_is_a_shape_mismatch() {
        let mut l = layer(ActivationKind::Sigmoid);
        assert!(matches!(
            l.feed_forward(array![[1.0, 2.0, 3.0]]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn predict_scales_without_mutating() {
        let mut l = layer(ActivationKind::Tanh);
        let x = array![[1.0, -1.0]];
        let trained = l.feed_forward(x.clone()).unwrap().clone();
        assert_abs_diff_eq!(l.predict(&x, 1.0).unwrap(), trained, epsilon = 1e-15);

        let before = l.parameters().clone();
        let half = l.predict(&x, 0.5).unwrap();
        let again = l.predict(&x, 0.5).unwrap();
        assert_eq!(half, again);
        assert_eq!(l.parameters(), &before);
        let z = affine(&x, &before).unwrap() * 0.5;
        assert_abs_diff_eq!(half, z.mapv(f64::tanh), epsilon = 1e-15);
    }

    #[test]
    fn back_prop_uses_next_input_and_weights() {
        let mut l = layer(ActivationKind::Sigmoid);
        l.feed_forward(array![[1.0, 0.0]]).unwrap();
        let next_input = l.output().clone();
        let next_gradient = array![[0.5]];
        let next_weights = array![[2.0], [-1.0]];
        l.back_prop(Upstream {
            input: next_input.view(),
            gradient: next_gradient.view(),
            weights: next_weights.view(),
        })
        .unwrap();
        let expected = array![[
            next_input[[0, 0]] * (1.0 - next_input[[0, 0]]) * 1.0,
            next_input[[0, 1]] * (1.0 - next_input[[0, 1]]) * -0.5
        ]];
        assert_abs_diff_eq!(*l.gradient(), expected, epsilon = 1e-15);
    }

    #[test]
    fn update_follows_the_gradient_buffer() {
        let mut l = layer(ActivationKind::Sigmoid);
        l.feed_forward(array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let next_input = l.output().clone();
        let eye = array![[1.0, 0.0], [0.0, 1.0]];
        let g = array![[1.0, 0.0], [0.0, 1.0]];
        l.back_prop(Upstream {
            input: next_input.view(),
            gradient: g.view(),
            weights: eye.view(),
        })
        .unwrap();
        let delta = l.gradient().clone();
        let before = l.parameters().clone();
        l.update(0.1).unwrap();

        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let expected_w = &before.weights + &(x.t().dot(&delta) * 0.1);
        let expected_b = &before.bias + &(delta.mean_axis(Axis(0)).unwrap() * 0.1);
        assert_abs_diff_eq!(l.parameters().weights, expected_w, epsilon = 1e-15);
        assert_abs_diff_eq!(l.parameters().bias, expected_b, epsilon = 1e-15);
    }

    #[test]
    fn update_before_any_pass_is_a_no_op() {
        let mut l = layer(ActivationKind::Sigmoid);
        let before = l.parameters().clone();
        l.update(0.5).unwrap();
        assert_eq!(l.parameters(), &before);
    }

    #[test]
    fn masks_zero_output_and_gradient() {
        let mut l = layer(ActivationKind::Sigmoid);
        l.feed_forward(array![[1.0, 1.0]]).unwrap();
        let mask = array![[0.0, 1.0]];
        l.mask_output(&mask).unwrap();
        assert_eq!(l.output()[[0, 0]], 0.0);

        let next_input = l.output().clone();
        let g = array![[1.0, 1.0]];
        let eye = array![[1.0, 0.0], [0.0, 1.0]];
        l.back_prop(Upstream {
            input: next_input.view(),
            gradient: g.view(),
            weights: eye.view(),
        })
        .unwrap();
        l.mask_gradient(&mask).unwrap();
        assert_eq!(l.gradient()[[0, 0]], 0.0);
        assert!(l.gradient()[[0, 1]] != 0.0);
    }

    #[test]
    fn dropout_mask_matches_output_shape() {
        let l = layer(ActivationKind::Sigmoid);
        let mut rng = StdRng::seed_from_u64(9);
        let mask = l.dropout_mask(7, 0.5, &mut rng).unwrap();
        assert_eq!(mask.dim(), (7, 2));
    }

    #[test]
    fn set_parameters_checks_shape() {
        let mut l = layer(ActivationKind::Sigmoid);
        let wrong = LayerParameters {
            weights: Array2::zeros((3, 2)),
            bias: Array1::zeros(2),
        };
        assert!(l.set_parameters(wrong).is_err());
        let bad_bias = LayerParameters {
            weights: Array2::zeros((2, 2)),
            bias: Array1::zeros(3),
        };
        assert!(l.set_parameters(bad_bias).is_err());
    }
}
