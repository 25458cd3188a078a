//! The polynomial proxy for `exp(x)`: `relu((x / 2 + 1)^3)`.
//!
//! Only a scalar multiply, a scalar add, two multiplies and one relu clamp are used, in
//! that order. The encrypted evaluator replays exactly this sequence on ciphertexts, so
//! the two paths must not drift apart (no `powi`, no `exp`, no division by data).

use ndarray::{Array, Array1, ArrayBase, ArrayView2, Axis, Data, Dimension};

use crate::activation::{Activator, ReLU};

/// Elementwise `relu((x / 2 + 1)^3)` using the exact relu. Every entry of the result is >= 0.
pub fn exp_proxy<S, D>(x: &ArrayBase<S, D>) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    exp_proxy_with(x, &ReLU::new())
}

/// Same as [`exp_proxy`] with the clamp supplied by `relu`.
pub fn exp_proxy_with<A, S, D>(x: &ArrayBase<S, D>, relu: &A) -> Array<f64, D>
where
    A: Activator,
    S: Data<Elem = f64>,
    D: Dimension,
{
    x.mapv(|x| {
        let t = x * 0.5 + 1.0;
        relu.activate(t * t * t)
    })
}

/// Collapses each row of the proxy to its sum, the sole input of the surrogate network.
pub fn row_statistic(e: ArrayView2<f64>) -> Array1<f64> {
    e.sum_axis(Axis(1))
}
