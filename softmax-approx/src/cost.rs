use ndarray::ArrayView2;

use crate::errors::ShapeMismatch;

/// Mean of the squared differences over every element of the two batches.
pub fn mean_squared_error(
    actual: ArrayView2<f64>,
    desired: ArrayView2<f64>,
) -> Result<f64, ShapeMismatch> {
    if actual.dim() != desired.dim() {
        return Err(ShapeMismatch::new_with_msg(
            desired.len(),
            actual.len(),
            "expected and actual outputs must have the same shape",
        ));
    }

    if actual.is_empty() {
        return Ok(0.0);
    }

    let sum: f64 = (&actual - &desired).mapv(|d| d * d).sum();

    Ok(sum / actual.len() as f64)
}
