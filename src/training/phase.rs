use std::fmt;

use crate::data::{Batch, BatchSource};
use crate::error::{ComputeError, TrainingError};
use crate::model::{Classifier, LossFn, Optimizer};
use crate::training::metrics::{LossWindow, MetricsSink};

pub const TRAIN_LOSS_TAG: &str = "Train/Loss";

/// One full pass over either the training or the validation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Valid,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => f.write_str("train"),
            Phase::Valid => f.write_str("valid"),
        }
    }
}

/// Outcome of a single phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    pub accuracy_percent: f64,
    pub examples_seen: usize,
    /// Mean per-batch loss, only for training phases.
    pub mean_loss: Option<f64>,
}

/// Training iterations counted across the whole run, with the loss window
/// used for periodic `Train/Loss` reporting.
#[derive(Debug, Clone)]
pub struct StepProgress {
    step: usize,
    window: LossWindow,
}

impl StepProgress {
    pub fn new(loss_log_interval: usize) -> Self {
        StepProgress {
            step: 0,
            window: LossWindow::new(loss_log_interval),
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Count one training iteration. Returns the window mean when the
    /// iteration index is a multiple of the logging interval.
    fn advance(&mut self, loss: f32) -> Option<f64> {
        self.step += 1;
        self.window.push(loss);
        if self.step % self.window.interval() == 0 {
            self.window.take_mean()
        } else {
            None
        }
    }
}

/// Run one full pass of `phase` over `source`.
///
/// Compute failures are returned unchanged; there is no partial recovery.
pub fn run_phase<M, L, O, S, K>(
    phase: Phase,
    source: &mut S,
    model: &mut M,
    loss_fn: &L,
    optim: &mut O,
    progress: &mut StepProgress,
    sink: &mut K,
) -> Result<PhaseResult, TrainingError>
where
    M: Classifier,
    L: LossFn<M>,
    O: Optimizer<M>,
    S: BatchSource<Input = M::Input> + ?Sized,
    K: MetricsSink + ?Sized,
{
    model.set_phase(phase);

    let mut correct = 0usize;
    let mut total = 0usize;
    let mut loss_sum = 0.0f64;
    let mut batches = 0usize;

    for batch in source.batches() {
        let Batch { input, labels } = batch?;

        // Gradients must not carry over from the previous batch.
        optim.zero_grad();
        let scores = model.forward(input)?;
        let predictions = model.predict(&scores)?;
        if predictions.len() != labels.len() {
            return Err(ComputeError::LabelCount {
                predictions: predictions.len(),
                labels: labels.len(),
            }
            .into());
        }

        if phase == Phase::Train {
            let loss = loss_fn.compute(scores, &labels)?;
            let value = optim.backward(model, loss)?;
            optim.step(model)?;

            loss_sum += value as f64;
            batches += 1;
            if let Some(mean) = progress.advance(value) {
                let step = progress.step();
                sink.record(TRAIN_LOSS_TAG, mean, step);
                tracing::info!(step, loss = mean, "running loss");
            }
        }

        correct += predictions
            .iter()
            .zip(&labels)
            .filter(|(p, l)| p == l)
            .count();
        total += labels.len();
    }

    if total == 0 {
        return Err(TrainingError::EmptyPhase(phase));
    }

    let accuracy_percent = 100.0 * correct as f64 / total as f64;
    let mean_loss = (batches > 0).then(|| loss_sum / batches as f64);
    tracing::info!(
        %phase,
        accuracy = accuracy_percent,
        examples = total,
        "phase complete"
    );

    Ok(PhaseResult {
        accuracy_percent,
        examples_seen: total,
        mean_loss,
    })
}
