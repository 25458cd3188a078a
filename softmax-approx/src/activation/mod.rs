use ndarray::{Array, ArrayBase, Data, Dimension};
use serde_derive::{Deserialize, Serialize};

pub mod polynomial_relu;
pub mod relu;

pub use polynomial_relu::PolynomialReLU;
pub use relu::ReLU;

pub trait Activator {
    fn activate(&self, z: f64) -> f64;
    fn activate_derivative(&self, z: f64) -> f64;
}

/// The relu variant a network is built with. `Exact` clamps with a sign test, which
/// ciphertexts can't do; `Polynomial` uses only add and multiply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReluStrategy {
    Exact(ReLU),
    Polynomial(PolynomialReLU),
}

impl ReluStrategy {
    pub fn exact() -> Self {
        ReluStrategy::Exact(ReLU::new())
    }

    pub fn polynomial(bound: f64) -> Self {
        ReluStrategy::Polynomial(PolynomialReLU::new(bound))
    }
}

impl Default for ReluStrategy {
    fn default() -> Self {
        Self::exact()
    }
}

impl Activator for ReluStrategy {
    fn activate(&self, z: f64) -> f64 {
        match self {
            ReluStrategy::Exact(r) => r.activate(z),
            ReluStrategy::Polynomial(p) => p.activate(z),
        }
    }

    fn activate_derivative(&self, z: f64) -> f64 {
        match self {
            ReluStrategy::Exact(r) => r.activate_derivative(z),
            ReluStrategy::Polynomial(p) => p.activate_derivative(z),
        }
    }
}

pub fn activate_array<A, S, D>(z: &ArrayBase<S, D>, activator: &A) -> Array<f64, D>
where
    A: Activator,
    S: Data<Elem = f64>,
    D: Dimension,
{
    z.mapv(|z| activator.activate(z))
}

pub fn activate_derivative_array<A, S, D>(z: &ArrayBase<S, D>, activator: &A) -> Array<f64, D>
where
    A: Activator,
    S: Data<Elem = f64>,
    D: Dimension,
{
    z.mapv(|z| activator.activate_derivative(z))
}
