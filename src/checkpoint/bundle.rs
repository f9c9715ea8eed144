use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Directory key for a run's checkpoints, formatted `YYYY.M.D` without padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateBucket(String);

impl DateBucket {
    pub fn from_date(date: NaiveDate) -> Self {
        DateBucket(format!("{}.{}.{}", date.year(), date.month(), date.day()))
    }

    /// Bucket for the current local calendar day.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DateBucket {
    fn from(value: &str) -> Self {
        DateBucket(value.to_string())
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of model parameters and optimizer state written on promotion.
///
/// Bundles are immutable once built; a newer version supersedes an older one
/// but never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointBundle {
    version: u32,
    date_bucket: DateBucket,
    created_at: i64,
    train_accuracy: f64,
    model_parameters: Vec<u8>,
    optimizer_state: Vec<u8>,
}

impl CheckpointBundle {
    pub fn new(
        version: u32,
        date_bucket: DateBucket,
        train_accuracy: f64,
        model_parameters: Vec<u8>,
        optimizer_state: Vec<u8>,
    ) -> Self {
        CheckpointBundle {
            version,
            date_bucket,
            created_at: Local::now().timestamp(),
            train_accuracy,
            model_parameters,
            optimizer_state,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn date_bucket(&self) -> &DateBucket {
        &self.date_bucket
    }

    /// Creation time in unix seconds.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn train_accuracy(&self) -> f64 {
        self.train_accuracy
    }

    pub fn model_parameters(&self) -> &[u8] {
        &self.model_parameters
    }

    pub fn optimizer_state(&self) -> &[u8] {
        &self.optimizer_state
    }
}
