use crate::activation::Activator;
use serde_derive::{Deserialize, Serialize};

// Least-squares degree-2 fit of relu on [-1, 1]: 3/32 + x/2 + 15x^2/32.
const C0: f64 = 3.0 / 32.0;
const C1: f64 = 0.5;
const C2: f64 = 15.0 / 32.0;

/// Quadratic stand-in for relu, accurate on `[-bound, bound]`.
///
/// Scaling the unit fit by `bound` gives `relu(x) = bound * relu(x / bound)`
/// ≈ `C0 * bound + C1 * x + C2 * x^2 / bound`, which needs only additions and
/// multiplications and so can be evaluated on ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolynomialReLU {
    pub bound: f64,
}

impl PolynomialReLU {
    pub fn new(bound: f64) -> Self {
        Self { bound }
    }

    /// Coefficients `[c0, c1, c2]` of `c0 + c1 * x + c2 * x^2` for this bound.
    pub fn coefficients(&self) -> [f64; 3] {
        [C0 * self.bound, C1, C2 / self.bound]
    }
}

impl Activator for PolynomialReLU {
    fn activate(&self, z: f64) -> f64 {
        let [c0, c1, c2] = self.coefficients();
        c0 + z * (c1 + z * c2)
    }

    fn activate_derivative(&self, z: f64) -> f64 {
        let [_, c1, c2] = self.coefficients();
        c1 + 2.0 * c2 * z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ReLU;

    #[test]
    fn unit_bound_matches_fit() {
        let p = PolynomialReLU::new(1.0);
        assert!((p.activate(0.0) - 0.09375).abs() < 1e-12);
        assert!((p.activate(1.0) - (0.09375 + 0.5 + 0.46875)).abs() < 1e-12);
        assert!((p.activate(-1.0) - (0.09375 - 0.5 + 0.46875)).abs() < 1e-12);
    }

    #[test]
    fn stays_close_to_relu_inside_bound() {
        let p = PolynomialReLU::new(4.0);
        let exact = ReLU::new();
        for i in -40..=40 {
            let z = i as f64 / 10.0;
            // max error of the unit fit is 3/32 at 0, scaled by the bound
            assert!((p.activate(z) - exact.activate(z)).abs() <= 0.09375 * 4.0 + 1e-12);
        }
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let p = PolynomialReLU::new(16.0);
        let h = 1e-5;
        for &z in &[-10.0, -1.0, 0.0, 3.5, 12.0] {
            let numeric = (p.activate(z + h) - p.activate(z - h)) / (2.0 * h);
            assert!((numeric - p.activate_derivative(z)).abs() < 1e-6);
        }
    }
}
