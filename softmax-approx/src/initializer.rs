use clap::ValueEnum;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;
use serde_derive::{Deserialize, Serialize};

use crate::LayerIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    /// Weights and biases uniform in `±1/sqrt(fan_in)`, the usual default for linear layers.
    #[default]
    LinearDefault,
    /// Normal weights with variance `2/fan_in`, zero biases.
    #[serde(rename = "he")]
    #[value(name = "he")]
    HeForReLUAndVariants,
}

pub fn get_init_weights_and_biases<R>(
    l: LayerIndex,
    sizes: &[usize],
    initializer: &Initializer,
    rng: &mut R,
) -> (Array2<f64>, Array1<f64>)
where
    R: Rng + ?Sized,
{
    assert!(l > 0, "not valid for input layer");

    let fan_in = sizes[l - 1];
    let fan_out = sizes[l];

    match initializer {
        Initializer::LinearDefault => {
            let bound = 1.0 / (fan_in as f64).sqrt();
            let weights_m =
                Array2::from_shape_simple_fn((fan_out, fan_in), || rng.gen_range(-bound..bound));
            let bias_v = Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bound..bound));
            (weights_m, bias_v)
        }
        Initializer::HeForReLUAndVariants => {
            let std_dev = (2.0_f64 / fan_in as f64).sqrt(); // See Table 11-1 in HOML
            let weights_m = Array2::from_shape_simple_fn((fan_out, fan_in), || {
                let z: f64 = rng.sample(StandardNormal);
                z * std_dev
            });
            let bias_v = Array1::zeros(fan_out);
            (weights_m, bias_v)
        }
    }
}
