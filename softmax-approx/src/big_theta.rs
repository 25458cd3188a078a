use ndarray::{Array1, Array2, Zip};
use serde_derive::{Deserialize, Serialize};

use crate::LayerIndex;

/// All weights and biases of a fully-connected network, plus the layer sizes they were
/// built for. Layer 0 is the input layer and has no parameters, so `weights[l - 1]` belongs
/// to layer `l` and has shape `sizes[l] x sizes[l - 1]`.
///
/// Gradients and optimizer moments use the same type, which keeps the optimizer arithmetic
/// elementwise over matching shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigTheta {
    pub sizes: Vec<usize>,
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

impl BigTheta {
    pub fn zero_from_sizes(sizes: &[usize]) -> Self {
        let mut weights = Vec::new();
        let mut biases = Vec::new();

        for l in 1..sizes.len() {
            weights.push(Array2::zeros((sizes[l], sizes[l - 1])));
            biases.push(Array1::zeros(sizes[l]));
        }

        BigTheta {
            sizes: sizes.to_vec(),
            weights,
            biases,
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self::zero_from_sizes(&self.sizes)
    }

    /// Weights of layer `layer_index`. Panics for the input layer or an index past the output layer.
    pub fn weights_at_layer(&self, layer_index: LayerIndex) -> &Array2<f64> {
        &self.weights[layer_index - 1]
    }

    pub fn weights_at_layer_mut(&mut self, layer_index: LayerIndex) -> &mut Array2<f64> {
        &mut self.weights[layer_index - 1]
    }

    pub fn bias_at_layer(&self, layer_index: LayerIndex) -> &Array1<f64> {
        &self.biases[layer_index - 1]
    }

    pub fn bias_at_layer_mut(&mut self, layer_index: LayerIndex) -> &mut Array1<f64> {
        &mut self.biases[layer_index - 1]
    }

    /// Checks that every parameter array has the shape `sizes` implies. Returns a description
    /// of the first problem found.
    pub fn check_shapes(&self) -> Result<(), String> {
        let expected_layers = self.sizes.len().saturating_sub(1);
        if self.weights.len() != expected_layers || self.biases.len() != expected_layers {
            return Err(format!(
                "expected {} parameter layers, found {} weight matrices and {} bias vectors",
                expected_layers,
                self.weights.len(),
                self.biases.len()
            ));
        }

        for l in 1..self.sizes.len() {
            let w = self.weights_at_layer(l);
            if w.dim() != (self.sizes[l], self.sizes[l - 1]) {
                return Err(format!(
                    "layer {} weights have shape {:?}, expected ({}, {})",
                    l,
                    w.dim(),
                    self.sizes[l],
                    self.sizes[l - 1]
                ));
            }
            let b = self.bias_at_layer(l);
            if b.len() != self.sizes[l] {
                return Err(format!(
                    "layer {} biases have length {}, expected {}",
                    l,
                    b.len(),
                    self.sizes[l]
                ));
            }
        }

        Ok(())
    }

    /// Returns the weights and biases flattened into one vector, layer by layer, weights
    /// (row-major) before biases.
    pub fn unroll(&self) -> Vec<f64> {
        let mut unrolled_vec = Vec::new();
        for (w, b) in self.weights.iter().zip(self.biases.iter()) {
            unrolled_vec.extend(w.iter());
            unrolled_vec.extend(b.iter());
        }
        unrolled_vec
    }

    pub fn mult_scalar_in_place(&mut self, scalar: f64) {
        self.map_in_place(|x| x * scalar);
    }

    pub fn add_scalar_to_each_element_in_place(&mut self, scalar: f64) {
        self.map_in_place(|x| x + scalar);
    }

    pub fn elementwise_square_root_in_place(&mut self) {
        self.map_in_place(f64::sqrt);
    }

    pub fn add_in_place(&mut self, other: &Self) {
        self.zip_in_place(other, |a, b| *a += b);
    }

    pub fn subtract_in_place(&mut self, other: &Self) {
        self.zip_in_place(other, |a, b| *a -= b);
    }

    pub fn elementwise_mult_in_place(&mut self, other: &Self) {
        self.zip_in_place(other, |a, b| *a *= b);
    }

    pub fn elementwise_divide_in_place(&mut self, other: &Self) {
        self.zip_in_place(other, |a, b| *a /= b);
    }

    /// `self = self * decay + other * (1 - decay)`, the exponential moving average step
    /// both Adam moments use.
    pub fn decay_towards(&mut self, other: &Self, decay: f64) {
        self.zip_in_place(other, |a, b| *a = *a * decay + b * (1.0 - decay));
    }

    fn map_in_place<F>(&mut self, f: F)
    where
        F: Fn(f64) -> f64,
    {
        for w in self.weights.iter_mut() {
            w.mapv_inplace(&f);
        }
        for b in self.biases.iter_mut() {
            b.mapv_inplace(&f);
        }
    }

    fn zip_in_place<F>(&mut self, other: &Self, f: F)
    where
        F: Fn(&mut f64, f64),
    {
        for (w, other_w) in self.weights.iter_mut().zip(other.weights.iter()) {
            Zip::from(w).and(other_w).for_each(|x, &y| f(x, y));
        }
        for (bias, other_bias) in self.biases.iter_mut().zip(other.biases.iter()) {
            Zip::from(bias).and(other_bias).for_each(|x, &y| f(x, y));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn get_1_2_1_big_theta() -> BigTheta {
        BigTheta {
            sizes: vec![1, 2, 1],
            weights: vec![array![[1.0], [2.0]], array![[3.0, 4.0]]],
            biases: vec![array![0.5, -0.5], array![1.5]],
        }
    }

    #[test]
    fn zero_from_sizes_has_layer_shapes() {
        let bt = BigTheta::zero_from_sizes(&[1, 64, 64, 1]);
        assert_eq!(bt.weights_at_layer(1).dim(), (64, 1));
        assert_eq!(bt.weights_at_layer(2).dim(), (64, 64));
        assert_eq!(bt.weights_at_layer(3).dim(), (1, 64));
        assert_eq!(bt.bias_at_layer(3).len(), 1);
        assert!(bt.check_shapes().is_ok());
    }

    #[test]
    fn test_unroll() {
        let bt = get_1_2_1_big_theta();
        assert_eq!(bt.unroll(), vec![1.0, 2.0, 0.5, -0.5, 3.0, 4.0, 1.5]);
    }

    #[test]
    fn check_shapes_reports_bad_layer() {
        let mut bt = get_1_2_1_big_theta();
        bt.biases[1] = array![1.0, 2.0];
        let msg = bt.check_shapes().unwrap_err();
        assert!(msg.contains("layer 2 biases"), "{}", msg);
    }

    #[test]
    fn elementwise_ops() {
        let mut bt = get_1_2_1_big_theta();
        let other = get_1_2_1_big_theta();

        bt.add_in_place(&other);
        assert_eq!(bt.unroll(), vec![2.0, 4.0, 1.0, -1.0, 6.0, 8.0, 3.0]);

        bt.elementwise_divide_in_place(&other);
        assert_eq!(bt.unroll(), vec![2.0; 7]);

        bt.elementwise_mult_in_place(&bt.clone());
        bt.elementwise_square_root_in_place();
        bt.add_scalar_to_each_element_in_place(1.0);
        bt.mult_scalar_in_place(0.5);
        assert_eq!(bt.unroll(), vec![1.5; 7]);

        bt.subtract_in_place(&bt.clone());
        assert_eq!(bt, get_1_2_1_big_theta().zeros_like());
    }

    #[test]
    fn decay_towards_is_ema() {
        let mut m = get_1_2_1_big_theta().zeros_like();
        let g = get_1_2_1_big_theta();
        m.decay_towards(&g, 0.9);
        let expected: Vec<f64> = g.unroll().iter().map(|x| x * 0.1).collect();
        for (a, b) in m.unroll().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
