//! Epoch orchestration: train and validation phases, accuracy-gated
//! checkpoint promotion, and scalar metrics.

pub mod metrics;
pub mod phase;
pub mod trainer;

#[cfg(test)]
pub(crate) mod testing;

pub use metrics::{LossWindow, MemorySink, MetricsConfig, MetricsSink, ScalarWriter};
pub use phase::{run_phase, Phase, PhaseResult, StepProgress, TRAIN_LOSS_TAG};
pub use trainer::{
    run_training, PhaseStreams, RunState, RunSummary, Trainer, TrainerConfig,
    TRAIN_PRECISION_TAG, VALID_PRECISION_TAG,
};
