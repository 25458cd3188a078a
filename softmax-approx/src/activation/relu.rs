use crate::activation::Activator;
use serde_derive::{Deserialize, Serialize};

/// `max(z, 0)`. Needs a sign test, so it is only available on plaintext or on runtimes that
/// can compare ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReLU {}

impl ReLU {
    pub fn new() -> ReLU {
        ReLU {}
    }
}

impl Activator for ReLU {
    fn activate(&self, z: f64) -> f64 {
        z.max(0.0)
    }

    /// Zero at the kink.
    fn activate_derivative(&self, z: f64) -> f64 {
        if z > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}
