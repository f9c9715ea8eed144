//! Collaborator interfaces driven by the training loop, plus their burn
//! implementations.

mod learner;
pub mod network;

use crate::error::{CheckpointError, ComputeError};
use crate::training::Phase;

pub use learner::{AdamOptimizer, CrossEntropy, VideoClassifier};
pub use network::{VideoNetwork, VideoNetworkConfig};

/// A model that maps batches of inputs to class scores.
pub trait Classifier {
    type Input;
    type Scores;
    /// Differentiable scalar produced by a [`LossFn`].
    type Loss;

    /// Switch between training behaviour (gradients, dropout) and evaluation.
    fn set_phase(&mut self, phase: Phase);

    fn forward(&self, input: Self::Input) -> Result<Self::Scores, ComputeError>;

    /// Predicted class index per example (argmax over the class scores).
    fn predict(&self, scores: &Self::Scores) -> Result<Vec<usize>, ComputeError>;

    /// Serialized snapshot of the current parameters.
    fn parameters_state(&self) -> Result<Vec<u8>, CheckpointError>;

    fn load_parameters_state(&mut self, state: &[u8]) -> Result<(), CheckpointError>;
}

/// Loss between class scores and integral labels.
pub trait LossFn<M: Classifier> {
    fn compute(&self, scores: M::Scores, labels: &[usize]) -> Result<M::Loss, ComputeError>;
}

/// Gradient-based parameter updates for a [`Classifier`].
pub trait Optimizer<M: Classifier> {
    /// Discard any gradients retained from a previous batch.
    fn zero_grad(&mut self);

    /// Propagate gradients of `loss` through `model`. Returns the scalar loss value.
    fn backward(&mut self, model: &M, loss: M::Loss) -> Result<f32, ComputeError>;

    /// Apply one update using the gradients from the last `backward`.
    fn step(&mut self, model: &mut M) -> Result<(), ComputeError>;

    fn learning_rate(&self) -> f64;

    /// Serialized snapshot of the optimizer's internal state.
    fn state(&self) -> Result<Vec<u8>, CheckpointError>;
}
