use ndarray::{Array2, ArrayView2};
use rand::Rng;
use tracing::debug;

use crate::reference_softmax::softmax_rows;

pub const DEFAULT_INPUT_RANGE: f64 = 3.0;

/// Inputs and their exact softmax labels. Read-only once generated; the optimizer never
/// touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    inputs: Array2<f64>,
    labels: Array2<f64>,
}

impl TrainingSet {
    /// Labels `inputs` with the reference softmax.
    pub fn from_inputs(inputs: Array2<f64>) -> Self {
        let labels = softmax_rows(inputs.view());
        Self { inputs, labels }
    }

    pub fn inputs(&self) -> ArrayView2<'_, f64> {
        self.inputs.view()
    }

    pub fn labels(&self) -> ArrayView2<'_, f64> {
        self.labels.view()
    }

    pub fn num_samples(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn input_size(&self) -> usize {
        self.inputs.ncols()
    }
}

/// Draws rows uniformly from `[-range, range)` and labels them with the reference softmax.
#[derive(Debug, Clone)]
pub struct DataGenerator {
    num_samples: usize,
    input_size: usize,
    range: f64,
}

impl DataGenerator {
    pub fn new(num_samples: usize, input_size: usize) -> Self {
        Self {
            num_samples,
            input_size,
            range: DEFAULT_INPUT_RANGE,
        }
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    pub fn generate<R>(&self, rng: &mut R) -> TrainingSet
    where
        R: Rng + ?Sized,
    {
        debug!(
            num_samples = self.num_samples,
            input_size = self.input_size,
            range = self.range,
            "generating training data"
        );

        let width = 2.0 * self.range;
        let inputs = Array2::from_shape_simple_fn((self.num_samples, self.input_size), || {
            rng.gen::<f64>() * width - self.range
        });

        TrainingSet::from_inputs(inputs)
    }
}
