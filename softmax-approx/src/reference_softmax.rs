use ndarray::{Array2, ArrayView2, Axis};

/// Exact row-wise softmax. Each row is shifted by its own max before exponentiating.
///
/// Only used to label training data; nothing on the encrypted path calls it.
pub fn softmax_rows(x: ArrayView2<f64>) -> Array2<f64> {
    let mut out = x.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max_logit = row.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_logit).exp());
        let sum_exps = row.sum();
        row.mapv_inplace(|v| v / sum_exps);
    }
    out
}
