//! Scripted collaborators for exercising the training loop without a backend.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::data::{Batch, BatchSource};
use crate::error::{CheckpointError, ComputeError, DataError};
use crate::model::{Classifier, LossFn, Optimizer};
use crate::training::Phase;

/// Classifier whose "scores" are the predictions carried in the input.
///
/// `generation` counts optimizer steps and doubles as the parameter state.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    pub phases: Vec<Phase>,
    pub generation: u32,
    pub fail_forward: bool,
    /// Generations applied through `load_parameters_state`.
    pub loaded: Vec<u32>,
}

impl Classifier for ScriptedClassifier {
    type Input = Vec<usize>;
    type Scores = Vec<usize>;
    type Loss = f32;

    fn set_phase(&mut self, phase: Phase) {
        self.phases.push(phase);
    }

    fn forward(&self, input: Vec<usize>) -> Result<Vec<usize>, ComputeError> {
        if self.fail_forward {
            return Err(ComputeError::ShapeMismatch {
                expected: vec![input.len(), 1],
                actual: vec![input.len()],
            });
        }
        Ok(input)
    }

    fn predict(&self, scores: &Vec<usize>) -> Result<Vec<usize>, ComputeError> {
        Ok(scores.clone())
    }

    fn parameters_state(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok(self.generation.to_le_bytes().to_vec())
    }

    fn load_parameters_state(&mut self, state: &[u8]) -> Result<(), CheckpointError> {
        let bytes: [u8; 4] = state
            .try_into()
            .map_err(|_| CheckpointError::Record(format!("{} state bytes", state.len())))?;
        self.generation = u32::from_le_bytes(bytes);
        self.loaded.push(self.generation);
        Ok(())
    }
}

/// Loss that replays a fixed script, then falls back to 1.0.
#[derive(Debug, Default)]
pub struct ScriptedLoss {
    values: RefCell<VecDeque<f32>>,
}

impl ScriptedLoss {
    pub fn new(values: impl IntoIterator<Item = f32>) -> Self {
        ScriptedLoss {
            values: RefCell::new(values.into_iter().collect()),
        }
    }
}

impl LossFn<ScriptedClassifier> for ScriptedLoss {
    fn compute(&self, _scores: Vec<usize>, _labels: &[usize]) -> Result<f32, ComputeError> {
        Ok(self.values.borrow_mut().pop_front().unwrap_or(1.0))
    }
}

#[derive(Debug, Default)]
pub struct CountingOptimizer {
    pub zero_grads: usize,
    pub steps: usize,
    pending: Option<f32>,
}

impl Optimizer<ScriptedClassifier> for CountingOptimizer {
    fn zero_grad(&mut self) {
        self.zero_grads += 1;
        self.pending = None;
    }

    fn backward(&mut self, _model: &ScriptedClassifier, loss: f32) -> Result<f32, ComputeError> {
        self.pending = Some(loss);
        Ok(loss)
    }

    fn step(&mut self, model: &mut ScriptedClassifier) -> Result<(), ComputeError> {
        self.pending.take().ok_or(ComputeError::MissingGradients)?;
        self.steps += 1;
        model.generation += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        1e-4
    }

    fn state(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok((self.steps as u64).to_le_bytes().to_vec())
    }
}

/// Batch of `total` examples labelled 0 where the first `correct` predictions hit.
pub fn batch_with_accuracy(total: usize, correct: usize) -> Batch<Vec<usize>> {
    let input = (0..total).map(|i| usize::from(i >= correct)).collect();
    Batch {
        input,
        labels: vec![0; total],
    }
}

/// Source that yields a different list of batches on each pass; exhausted
/// sources yield nothing.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    passes: VecDeque<Vec<Batch<Vec<usize>>>>,
    pub passes_started: usize,
}

impl ScriptedSource {
    pub fn new(passes: impl IntoIterator<Item = Vec<Batch<Vec<usize>>>>) -> Self {
        ScriptedSource {
            passes: passes.into_iter().collect(),
            passes_started: 0,
        }
    }

    /// One single-batch pass per accuracy, each with `total` examples.
    pub fn with_accuracies(total: usize, correct: &[usize]) -> Self {
        Self::new(correct.iter().map(|&c| vec![batch_with_accuracy(total, c)]))
    }
}

impl BatchSource for ScriptedSource {
    type Input = Vec<usize>;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch<Vec<usize>>, DataError>> + '_> {
        self.passes_started += 1;
        let pass = self.passes.pop_front().unwrap_or_default();
        Box::new(pass.into_iter().map(Ok))
    }
}
