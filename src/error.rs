use std::path::PathBuf;

use crate::training::Phase;

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint at {path}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("checkpoint {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: bincode::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] bincode::Error),

    #[error("failed to record parameters: {0}")]
    Record(String),
}

/// Errors raised while computing a forward or backward pass.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("input shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("batch has {predictions} predictions but {labels} labels")]
    LabelCount { predictions: usize, labels: usize },

    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("optimizer step called without gradients")]
    MissingGradients,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors produced by batch sources.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("clip {path} has {actual} values, expected {expected}")]
    ClipSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("clip {path} has label {label} but the manifest declares {classes} classes")]
    Label {
        path: PathBuf,
        label: usize,
        classes: usize,
    },

    #[error("clip index {index} out of range for {len} clips")]
    MissingClip { index: usize, len: usize },

    #[error("pass ended after {actual} of {expected} clips")]
    Incomplete { expected: usize, actual: usize },
}

/// Errors surfaced when closing a metrics sink.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to create metrics log {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write metrics: {0}")]
    Write(#[from] std::io::Error),

    #[error("failed to encode metrics record: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that can occur during training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("{0} phase saw no examples")]
    EmptyPhase(Phase),

    #[error("compute error: {0}")]
    Compute(#[from] ComputeError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
