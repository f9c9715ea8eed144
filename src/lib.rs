//! # Clip Trainer
//!
//! Trains a video clip classifier epoch by epoch with the Burn ML framework.
//! A checkpoint is promoted whenever training accuracy beats the best seen so
//! far by a fixed margin; only freshly promoted checkpoints are reloaded from
//! disk and validated.
//!
//! ## Modules
//!
//! - [`training`]: Phase executor, epoch orchestrator, metrics sinks
//! - [`checkpoint`]: Versioned checkpoint bundles under date-bucket directories
//! - [`model`]: Classifier/loss/optimizer interfaces and their Burn implementations
//! - [`data`]: Batch sources: in-memory and pre-decoded clip datasets
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod training;
