use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2};
use rand::Rng;

use crate::activation::{activate_array, activate_derivative_array, ReluStrategy};
use crate::approx_formula::{exp_proxy_with, row_statistic};
use crate::big_theta::BigTheta;
use crate::cost::mean_squared_error;
use crate::errors::{Result, ShapeMismatch, StorageError};
use crate::initializer::{get_init_weights_and_biases, Initializer};
use crate::reference_softmax::softmax_rows;
use crate::LayerIndex;

/// Input layer, two hidden layers, output layer.
pub const NUM_LAYERS: usize = 4;

pub fn layer_sizes(hidden_size: usize) -> Vec<usize> {
    vec![1, hidden_size, hidden_size, 1]
}

/// The weighted sum (`z`) and activation of one layer, kept from the forward pass for backprop.
/// For the input layer `z_v` is empty; the input *is* its activation.
#[derive(Debug, Clone)]
pub struct FeedForwardIntermediates {
    pub z_v: Array1<f64>,
    pub activation_v: Array1<f64>,
}

/// Drop-in softmax replacement: `S(x)_i = e_i * T(sum_j e_j)` where `e = relu((x / 2 + 1)^3)`
/// and `T` is a 1 -> H -> H -> 1 regressor with relu after the two hidden layers.
///
/// The regressor sees one scalar per row and emits one scalar per row, which is multiplied
/// back across that row's proxy. The encrypted evaluator relies on exactly this contract.
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateNetwork {
    input_size: usize,
    relu: ReluStrategy,
    theta: BigTheta,
}

impl SurrogateNetwork {
    /// A freshly initialized network using [`Initializer::LinearDefault`] for every layer.
    pub fn new<R>(input_size: usize, hidden_size: usize, relu: ReluStrategy, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::with_initializer(input_size, hidden_size, relu, Initializer::LinearDefault, rng)
    }

    pub fn with_initializer<R>(
        input_size: usize,
        hidden_size: usize,
        relu: ReluStrategy,
        initializer: Initializer,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let sizes = layer_sizes(hidden_size);
        let mut theta = BigTheta::zero_from_sizes(&sizes);

        for l in 1..NUM_LAYERS {
            let (w, b) = get_init_weights_and_biases(l, &sizes, &initializer, rng);
            *theta.weights_at_layer_mut(l) = w;
            *theta.bias_at_layer_mut(l) = b;
        }

        Self {
            input_size,
            relu,
            theta,
        }
    }

    /// Rebuilds a network from existing parameters, e.g. a checkpoint. The parameters must
    /// describe a `1 -> H -> H -> 1` network.
    pub fn from_parameters(
        input_size: usize,
        relu: ReluStrategy,
        theta: BigTheta,
    ) -> std::result::Result<Self, StorageError> {
        let hidden_size = theta.sizes.get(1).copied().unwrap_or(0);

        if theta.sizes != layer_sizes(hidden_size) || hidden_size == 0 {
            return Err(StorageError::ArchitectureMismatch {
                hidden_size,
                msg: format!("layer sizes are {:?}", theta.sizes),
            });
        }
        theta
            .check_shapes()
            .map_err(|msg| StorageError::ArchitectureMismatch { hidden_size, msg })?;

        Ok(Self {
            input_size,
            relu,
            theta,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.theta.sizes[1]
    }

    pub fn relu(&self) -> &ReluStrategy {
        &self.relu
    }

    pub fn parameters(&self) -> &BigTheta {
        &self.theta
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut BigTheta {
        &mut self.theta
    }

    /// Fails unless `x` is `rows x input_size`.
    pub fn check_input(&self, x: &ArrayView2<f64>) -> std::result::Result<(), ShapeMismatch> {
        if x.ncols() != self.input_size {
            return Err(ShapeMismatch::new_with_msg(
                self.input_size,
                x.ncols(),
                "row length must equal the network's input_size",
            ));
        }
        Ok(())
    }

    /// Runs a `rows x input_size` batch through the surrogate. The output has the input's shape.
    pub fn forward(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_input(&x)?;

        let e = exp_proxy_with(&x, &self.relu);
        let corrections = row_statistic(e.view()).mapv(|s| self.correction(s));

        Ok(e * &corrections.insert_axis(Axis(1)))
    }

    /// [`forward`](Self::forward) for inputs whose rank is only known at runtime.
    pub fn forward_dyn(&self, x: ArrayViewD<f64>) -> Result<Array2<f64>> {
        let ndim = x.ndim();
        let x = x.into_dimensionality::<Ix2>().map_err(|_| {
            ShapeMismatch::new_with_msg(2, ndim, "input rank must be 2 (rows x input_size)")
        })?;
        self.forward(x)
    }

    /// Mean squared error of the surrogate against the exact softmax of `x`.
    pub fn mse_against_reference(&self, x: ArrayView2<f64>) -> Result<f64> {
        let approx = self.forward(x)?;
        let exact = softmax_rows(x);
        Ok(mean_squared_error(approx.view(), exact.view())?)
    }

    /// The per-row correction factor for a row statistic.
    pub fn correction(&self, row_statistic: f64) -> f64 {
        let intermediates = self.feed_forward_capturing_intermediates(row_statistic);
        intermediates[NUM_LAYERS - 1].activation_v[0]
    }

    /// Proxy of one row and its correction factor's forward intermediates.
    pub fn forward_row(&self, x_row: ArrayView1<f64>) -> (Array1<f64>, Vec<FeedForwardIntermediates>) {
        let e = exp_proxy_with(&x_row, &self.relu);
        let intermediates = self.feed_forward_capturing_intermediates(e.sum());
        (e, intermediates)
    }

    /// Feeds a row statistic through the three linear layers, keeping `z` and the
    /// activation of every layer. The output layer has no activation.
    pub fn feed_forward_capturing_intermediates(
        &self,
        row_statistic: f64,
    ) -> Vec<FeedForwardIntermediates> {
        let mut intermediates = Vec::with_capacity(NUM_LAYERS);
        let mut activation_v = Array1::from_elem(1, row_statistic);

        intermediates.push(FeedForwardIntermediates {
            z_v: Array1::zeros(0),
            activation_v: activation_v.clone(),
        });

        for l in 1..NUM_LAYERS {
            let z_v = self.theta.weights_at_layer(l).dot(&activation_v) + self.theta.bias_at_layer(l);
            activation_v = if self.is_output_layer(l) {
                z_v.clone()
            } else {
                activate_array(&z_v, &self.relu)
            };
            intermediates.push(FeedForwardIntermediates {
                z_v,
                activation_v: activation_v.clone(),
            });
        }

        intermediates
    }

    /// Backpropagates `d_correction` (dLoss/dCorrection for one row) and adds the resulting
    /// weight and bias gradients into `gradients`.
    pub fn accumulate_gradients(
        &self,
        intermediates: &[FeedForwardIntermediates],
        d_correction: f64,
        gradients: &mut BigTheta,
    ) {
        // output layer is linear, so its error is the incoming derivative itself
        let mut error_v = Array1::from_elem(1, d_correction);

        for l in (1..NUM_LAYERS).rev() {
            if !self.is_output_layer(l) {
                error_v = self.theta.weights_at_layer(l + 1).t().dot(&error_v)
                    * activate_derivative_array(&intermediates[l].z_v, &self.relu);
            }

            let prev_activation_v = &intermediates[l - 1].activation_v;
            let weight_grad = error_v
                .view()
                .insert_axis(Axis(1))
                .dot(&prev_activation_v.view().insert_axis(Axis(0)));

            *gradients.weights_at_layer_mut(l) += &weight_grad;
            *gradients.bias_at_layer_mut(l) += &error_v;
        }
    }

    fn is_output_layer(&self, layer_index: LayerIndex) -> bool {
        layer_index == NUM_LAYERS - 1
    }
}
