//! Forward pass of the surrogate over encrypted row vectors.
//!
//! [`EncryptedEvaluator`] replays [`SurrogateNetwork::forward`] for a single row using nothing
//! but the operations of an [`EncryptedRuntime`]: ciphertext add and multiply, plaintext vector
//! add, plaintext scalar and matrix multiply, plus a relu supplied as an [`EncryptedRelu`].
//!
//! The row statistic is a plaintext matmul against a column of ones and the broadcast of the
//! correction factor is a plaintext matmul against a row of ones, so the decrypted output
//! matches the plaintext path row for row.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::activation::{Activator, PolynomialReLU, ReLU, ReluStrategy};
use crate::checkpoint::Checkpoint;
use crate::context::TrainingContext;
use crate::errors::{CapabilityError, Result, ShapeMismatch, StorageError};
use crate::network::{SurrogateNetwork, NUM_LAYERS};

/// The operations an encryption scheme offers on opaque row vectors. Nothing else may be
/// assumed of a ciphertext.
pub trait EncryptedRuntime {
    type Ciphertext: Clone;

    /// Number of slots in use.
    fn size(&self, ct: &Self::Ciphertext) -> usize;

    fn add(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> std::result::Result<Self::Ciphertext, CapabilityError>;

    fn add_plain(
        &self,
        a: &Self::Ciphertext,
        plain: ArrayView1<f64>,
    ) -> std::result::Result<Self::Ciphertext, CapabilityError>;

    /// Slot-wise product of two ciphertexts.
    fn mul(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> std::result::Result<Self::Ciphertext, CapabilityError>;

    fn mul_scalar(
        &self,
        a: &Self::Ciphertext,
        scalar: f64,
    ) -> std::result::Result<Self::Ciphertext, CapabilityError>;

    /// Row vector times plaintext matrix: a length `k` ciphertext and a `k x m` matrix give a
    /// length `m` ciphertext.
    fn matmul_plain(
        &self,
        a: &Self::Ciphertext,
        m: ArrayView2<f64>,
    ) -> std::result::Result<Self::Ciphertext, CapabilityError>;
}

/// A relu that can be evaluated on ciphertexts of runtime `R`.
pub trait EncryptedRelu<R: EncryptedRuntime> {
    fn relu(
        &self,
        runtime: &R,
        x: &R::Ciphertext,
    ) -> std::result::Result<R::Ciphertext, CapabilityError>;

    /// The training-time relu this evaluates, if it is one. Checkpoints are checked against it.
    fn strategy(&self) -> Option<ReluStrategy> {
        None
    }
}

impl<R: EncryptedRuntime> EncryptedRelu<R> for PolynomialReLU {
    fn relu(
        &self,
        runtime: &R,
        x: &R::Ciphertext,
    ) -> std::result::Result<R::Ciphertext, CapabilityError> {
        // c0 + x * (c1 + x * c2), the same association as the plaintext activation
        let [c0, c1, c2] = self.coefficients();
        let n = runtime.size(x);

        let inner = runtime.add_plain(
            &runtime.mul_scalar(x, c2)?,
            Array1::from_elem(n, c1).view(),
        )?;
        let quadratic = runtime.mul(x, &inner)?;
        runtime.add_plain(&quadratic, Array1::from_elem(n, c0).view())
    }

    fn strategy(&self) -> Option<ReluStrategy> {
        Some(ReluStrategy::Polynomial(*self))
    }
}

/// Encrypted row vector of the [`TransparentRuntime`]. The values are held in the clear.
#[derive(Debug, Clone, PartialEq)]
pub struct TransparentCiphertext(Array1<f64>);

impl TransparentCiphertext {
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }
}

/// Runtime that performs every ciphertext operation on plaintext values. Used to check that the
/// encrypted forward path agrees with the plaintext one, and as a stand-in wherever no real
/// encryption backend is wired up.
#[derive(Debug, Clone, Default)]
pub struct TransparentRuntime {
    slot_capacity: Option<usize>,
}

impl TransparentRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits ciphertexts to `slots` entries, like a scheme with a fixed ring dimension.
    pub fn with_slot_capacity(slots: usize) -> Self {
        Self {
            slot_capacity: Some(slots),
        }
    }

    pub fn encrypt(
        &self,
        values: ArrayView1<f64>,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        self.wrap("encrypt", values.to_owned())
    }

    pub fn decrypt(&self, ct: &TransparentCiphertext) -> Array1<f64> {
        ct.0.clone()
    }

    fn wrap(
        &self,
        op: &'static str,
        values: Array1<f64>,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        match self.slot_capacity {
            Some(slots) if values.len() > slots => Err(CapabilityError::Runtime {
                op,
                reason: format!("{} values exceed the {} available slots", values.len(), slots),
            }),
            _ => Ok(TransparentCiphertext(values)),
        }
    }

    fn check_len(op: &'static str, expected: usize, actual: usize) -> std::result::Result<(), CapabilityError> {
        if expected != actual {
            return Err(CapabilityError::LengthMismatch {
                op,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl EncryptedRuntime for TransparentRuntime {
    type Ciphertext = TransparentCiphertext;

    fn size(&self, ct: &TransparentCiphertext) -> usize {
        ct.0.len()
    }

    fn add(
        &self,
        a: &TransparentCiphertext,
        b: &TransparentCiphertext,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        Self::check_len("add", a.0.len(), b.0.len())?;
        self.wrap("add", &a.0 + &b.0)
    }

    fn add_plain(
        &self,
        a: &TransparentCiphertext,
        plain: ArrayView1<f64>,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        Self::check_len("add_plain", a.0.len(), plain.len())?;
        self.wrap("add_plain", &a.0 + &plain)
    }

    fn mul(
        &self,
        a: &TransparentCiphertext,
        b: &TransparentCiphertext,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        Self::check_len("mul", a.0.len(), b.0.len())?;
        self.wrap("mul", &a.0 * &b.0)
    }

    fn mul_scalar(
        &self,
        a: &TransparentCiphertext,
        scalar: f64,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        self.wrap("mul_scalar", &a.0 * scalar)
    }

    fn matmul_plain(
        &self,
        a: &TransparentCiphertext,
        m: ArrayView2<f64>,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        Self::check_len("matmul_plain", m.nrows(), a.0.len())?;
        self.wrap("matmul_plain", a.0.dot(&m))
    }
}

/// The exact relu needs a sign comparison, which only the transparent runtime can offer.
impl EncryptedRelu<TransparentRuntime> for ReLU {
    fn relu(
        &self,
        runtime: &TransparentRuntime,
        x: &TransparentCiphertext,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        runtime.wrap("relu", x.0.mapv(|v| self.activate(v)))
    }

    fn strategy(&self) -> Option<ReluStrategy> {
        Some(ReluStrategy::Exact(*self))
    }
}

impl EncryptedRelu<TransparentRuntime> for ReluStrategy {
    fn relu(
        &self,
        runtime: &TransparentRuntime,
        x: &TransparentCiphertext,
    ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
        match self {
            ReluStrategy::Exact(relu) => relu.relu(runtime, x),
            ReluStrategy::Polynomial(relu) => relu.relu(runtime, x),
        }
    }

    fn strategy(&self) -> Option<ReluStrategy> {
        Some(*self)
    }
}

/// Runs a trained surrogate over encrypted rows. Weights are plaintext, stored transposed to
/// `(in, out)` for the row-vector matmul convention, and never change after construction.
pub struct EncryptedEvaluator<R, F> {
    runtime: R,
    relu: F,
    input_size: usize,
    weights_t: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    ones_v: Array1<f64>,
    row_sum_m: Array2<f64>,
    broadcast_m: Array2<f64>,
}

impl<R, F> EncryptedEvaluator<R, F>
where
    R: EncryptedRuntime,
    F: EncryptedRelu<R>,
{
    pub fn new(runtime: R, relu: F, network: &SurrogateNetwork) -> Self {
        let theta = network.parameters();
        let input_size = network.input_size();

        Self {
            runtime,
            relu,
            input_size,
            weights_t: (1..NUM_LAYERS)
                .map(|l| theta.weights_at_layer(l).t().to_owned())
                .collect(),
            biases: (1..NUM_LAYERS)
                .map(|l| theta.bias_at_layer(l).clone())
                .collect(),
            ones_v: Array1::ones(input_size),
            row_sum_m: Array2::ones((input_size, 1)),
            broadcast_m: Array2::ones((1, input_size)),
        }
    }

    /// Fails with [`StorageError::ReluMismatch`] when `relu` reports a strategy other than the
    /// one the checkpoint was trained with.
    pub fn from_checkpoint(
        runtime: R,
        relu: F,
        checkpoint: Checkpoint,
    ) -> std::result::Result<Self, StorageError> {
        if let Some(injected) = relu.strategy() {
            if injected != checkpoint.relu {
                return Err(StorageError::ReluMismatch {
                    trained: checkpoint.relu,
                    injected,
                });
            }
        }
        let network = checkpoint.into_network()?;
        Ok(Self::new(runtime, relu, &network))
    }

    /// Reads the checkpoint at `path` from the context's store.
    pub fn load(runtime: R, relu: F, ctx: &TrainingContext, path: &Path) -> Result<Self> {
        let checkpoint = ctx.store().load(path)?;
        Ok(Self::from_checkpoint(runtime, relu, checkpoint)?)
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn relu(&self) -> &F {
        &self.relu
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Encrypted counterpart of [`SurrogateNetwork::forward`] for one row.
    pub fn forward(&self, x: &R::Ciphertext) -> Result<R::Ciphertext> {
        let rt = &self.runtime;

        let size = rt.size(x);
        if size != self.input_size {
            return Err(ShapeMismatch::new_with_msg(
                self.input_size,
                size,
                "ciphertext length must equal the evaluator's input_size",
            )
            .into());
        }

        // exp proxy: relu((x / 2 + 1)^3)
        let t = rt.add_plain(&rt.mul_scalar(x, 0.5)?, self.ones_v.view())?;
        let cube = rt.mul(&rt.mul(&t, &t)?, &t)?;
        let e = self.relu.relu(rt, &cube)?;

        let s = rt.matmul_plain(&e, self.row_sum_m.view())?;
        let h1 = self.relu.relu(rt, &self.dense(&s, 0)?)?;
        let h2 = self.relu.relu(rt, &self.dense(&h1, 1)?)?;
        let correction = self.dense(&h2, 2)?;

        let correction_row = rt.matmul_plain(&correction, self.broadcast_m.view())?;
        Ok(rt.mul(&e, &correction_row)?)
    }

    /// [`forward`](Self::forward) over several rows; stops at the first failure.
    pub fn forward_rows(&self, rows: &[R::Ciphertext]) -> Result<Vec<R::Ciphertext>> {
        rows.iter().map(|row| self.forward(row)).collect()
    }

    fn dense(
        &self,
        h: &R::Ciphertext,
        layer: usize,
    ) -> std::result::Result<R::Ciphertext, CapabilityError> {
        let z = self
            .runtime
            .matmul_plain(h, self.weights_t[layer].view())?;
        self.runtime.add_plain(&z, self.biases[layer].view())
    }
}

impl<R> EncryptedEvaluator<R, ReluStrategy>
where
    R: EncryptedRuntime,
    ReluStrategy: EncryptedRelu<R>,
{
    /// Evaluates with whichever relu the checkpoint was trained with.
    pub fn from_trained_checkpoint(
        runtime: R,
        checkpoint: Checkpoint,
    ) -> std::result::Result<Self, StorageError> {
        let relu = checkpoint.relu;
        Self::from_checkpoint(runtime, relu, checkpoint)
    }

    pub fn load_trained(runtime: R, ctx: &TrainingContext, path: &Path) -> Result<Self> {
        let checkpoint = ctx.store().load(path)?;
        Ok(Self::from_trained_checkpoint(runtime, checkpoint)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
    use crate::errors::SoftmaxApproxError;
    use crate::training_log::NullSink;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(input_size: usize) -> Array2<f64> {
        Array2::from_shape_fn((4, input_size), |(i, j)| {
            ((i * input_size + j) as f64 * 0.37).sin() * 3.0
        })
    }

    fn assert_parity(relu: ReluStrategy) {
        let mut rng = StdRng::seed_from_u64(21);
        let nn = SurrogateNetwork::new(8, 6, relu, &mut rng);
        let evaluator = EncryptedEvaluator::new(TransparentRuntime::new(), relu, &nn);

        let x = rows(8);
        let plain = nn.forward(x.view()).unwrap();

        for (i, row) in x.outer_iter().enumerate() {
            let ct = evaluator.runtime().encrypt(row).unwrap();
            let out = evaluator.runtime().decrypt(&evaluator.forward(&ct).unwrap());
            for (a, b) in out.iter().zip(plain.row(i).iter()) {
                assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()), "row {}: {} vs {}", i, a, b);
            }
        }
    }

    #[test]
    fn exact_relu_matches_plaintext_forward() {
        assert_parity(ReluStrategy::exact());
    }

    #[test]
    fn polynomial_relu_matches_plaintext_forward() {
        assert_parity(ReluStrategy::polynomial(16.0));
    }

    #[test]
    fn polynomial_relu_on_ciphertexts_matches_activation() {
        let rt = TransparentRuntime::new();
        let relu = PolynomialReLU::new(4.0);
        let x = array![-4.0, -1.0, 0.0, 2.5];
        let out = rt.decrypt(&relu.relu(&rt, &rt.encrypt(x.view()).unwrap()).unwrap());
        assert_eq!(out, x.mapv(|v| relu.activate(v)));
    }

    #[test]
    fn forward_rejects_wrong_length() {
        let nn = SurrogateNetwork::new(8, 4, ReluStrategy::exact(), &mut StdRng::seed_from_u64(2));
        let evaluator = EncryptedEvaluator::new(TransparentRuntime::new(), ReLU::new(), &nn);
        let ct = evaluator.runtime().encrypt(array![1.0, 2.0].view()).unwrap();
        match evaluator.forward(&ct) {
            Err(SoftmaxApproxError::ShapeMismatch(e)) => {
                assert_eq!(e.expected, 8);
                assert_eq!(e.actual, 2);
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    struct UnsupportedRelu;

    impl EncryptedRelu<TransparentRuntime> for UnsupportedRelu {
        fn relu(
            &self,
            _runtime: &TransparentRuntime,
            _x: &TransparentCiphertext,
        ) -> std::result::Result<TransparentCiphertext, CapabilityError> {
            Err(CapabilityError::Unsupported { op: "relu" })
        }
    }

    #[test]
    fn relu_capability_failure_is_surfaced() {
        let nn = SurrogateNetwork::new(4, 4, ReluStrategy::exact(), &mut StdRng::seed_from_u64(5));
        let evaluator = EncryptedEvaluator::new(TransparentRuntime::new(), UnsupportedRelu, &nn);
        let ct = evaluator.runtime().encrypt(Array1::zeros(4).view()).unwrap();
        assert!(matches!(
            evaluator.forward(&ct),
            Err(SoftmaxApproxError::Capability(CapabilityError::Unsupported { op: "relu" }))
        ));
    }

    #[test]
    fn runtime_slot_limit_is_surfaced() {
        // rows fit in 4 slots but the hidden layers need 16
        let nn = SurrogateNetwork::new(4, 16, ReluStrategy::exact(), &mut StdRng::seed_from_u64(5));
        let evaluator =
            EncryptedEvaluator::new(TransparentRuntime::with_slot_capacity(4), ReLU::new(), &nn);
        let ct = evaluator.runtime().encrypt(Array1::zeros(4).view()).unwrap();
        assert!(matches!(
            evaluator.forward(&ct),
            Err(SoftmaxApproxError::Capability(CapabilityError::Runtime { op: "matmul_plain", .. }))
        ));
    }

    #[test]
    fn transparent_runtime_checks_lengths() {
        let rt = TransparentRuntime::new();
        let a = rt.encrypt(array![1.0, 2.0].view()).unwrap();
        let b = rt.encrypt(array![1.0].view()).unwrap();
        assert_eq!(
            rt.add(&a, &b),
            Err(CapabilityError::LengthMismatch {
                op: "add",
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(rt.decrypt(&rt.add(&a, &a).unwrap()), array![2.0, 4.0]);
    }

    #[test]
    fn load_through_context_store() {
        let nn = SurrogateNetwork::new(8, 6, ReluStrategy::exact(), &mut StdRng::seed_from_u64(9));
        let path = Path::new("mem/softmax_trained.model");

        let mut sink = NullSink;
        let mut store = InMemoryCheckpointStore::default();
        store.save(&Checkpoint::from_network(&nn), path).unwrap();
        let ctx = TrainingContext::new("run-test", &mut sink, &mut store);

        let evaluator =
            EncryptedEvaluator::load(TransparentRuntime::new(), ReLU::new(), &ctx, path).unwrap();
        assert_eq!(evaluator.input_size(), 8);

        let missing = EncryptedEvaluator::load(
            TransparentRuntime::new(),
            ReLU::new(),
            &ctx,
            Path::new("mem/absent.model"),
        );
        assert!(matches!(
            missing,
            Err(SoftmaxApproxError::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn trained_relu_comes_from_the_checkpoint() {
        let relu = ReluStrategy::polynomial(16.0);
        let nn = SurrogateNetwork::new(8, 6, relu, &mut StdRng::seed_from_u64(21));
        let path = Path::new("mem/poly.model");

        let mut sink = NullSink;
        let mut store = InMemoryCheckpointStore::default();
        store.save(&Checkpoint::from_network(&nn), path).unwrap();
        let ctx = TrainingContext::new("run-test", &mut sink, &mut store);

        let evaluator =
            EncryptedEvaluator::load_trained(TransparentRuntime::new(), &ctx, path).unwrap();
        assert_eq!(*evaluator.relu(), relu);

        let x = rows(8);
        let expected = nn.forward(x.view()).unwrap();
        for (row, want) in x.outer_iter().zip(expected.outer_iter()) {
            let ct = evaluator.runtime().encrypt(row).unwrap();
            let got = evaluator.runtime().decrypt(&evaluator.forward(&ct).unwrap());
            for (a, b) in got.iter().zip(want.iter()) {
                assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn relu_other_than_trained_is_rejected() {
        let nn = SurrogateNetwork::new(
            8,
            6,
            ReluStrategy::polynomial(16.0),
            &mut StdRng::seed_from_u64(21),
        );
        let checkpoint = Checkpoint::from_network(&nn);

        let exact = EncryptedEvaluator::from_checkpoint(
            TransparentRuntime::new(),
            ReLU::new(),
            checkpoint.clone(),
        );
        assert!(matches!(
            exact,
            Err(StorageError::ReluMismatch {
                trained: ReluStrategy::Polynomial(_),
                injected: ReluStrategy::Exact(_),
            })
        ));

        let other_bound = EncryptedEvaluator::from_checkpoint(
            TransparentRuntime::new(),
            PolynomialReLU::new(8.0),
            checkpoint.clone(),
        );
        assert!(matches!(other_bound, Err(StorageError::ReluMismatch { .. })));

        // same coefficients as training
        assert!(EncryptedEvaluator::from_checkpoint(
            TransparentRuntime::new(),
            PolynomialReLU::new(16.0),
            checkpoint,
        )
        .is_ok());
    }

    #[test]
    fn forward_rows_processes_each_row() {
        let nn = SurrogateNetwork::new(8, 6, ReluStrategy::exact(), &mut StdRng::seed_from_u64(4));
        let evaluator = EncryptedEvaluator::new(TransparentRuntime::new(), ReLU::new(), &nn);
        let x = rows(8);
        let cts: Vec<_> = x
            .outer_iter()
            .map(|row| evaluator.runtime().encrypt(row).unwrap())
            .collect();
        let outputs = evaluator.forward_rows(&cts).unwrap();
        assert_eq!(outputs.len(), 4);
        assert!(outputs.iter().all(|ct| evaluator.runtime().size(ct) == 8));
    }
}
