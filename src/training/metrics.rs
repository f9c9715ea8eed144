use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::MetricsError;

/// Destination for scalar observations indexed by step.
pub trait MetricsSink {
    /// Append one observation. Failures are retained and reported by `close`.
    fn record(&mut self, tag: &str, value: f64, step: usize);

    /// Flush buffered observations and release the sink. Idempotent.
    fn close(&mut self) -> Result<(), MetricsError>;
}

/// A single recorded observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: usize,
}

/// Sink that keeps every observation in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<ScalarRecord>,
    closed: bool,
}

impl MemorySink {
    pub fn records(&self) -> &[ScalarRecord] {
        &self.records
    }

    /// `(step, value)` pairs recorded under `tag`, in recording order.
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, tag: &str, value: f64, step: usize) {
        if self.closed {
            tracing::warn!(tag, step, "observation recorded after close ignored");
            return;
        }
        self.records.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
    }

    fn close(&mut self) -> Result<(), MetricsError> {
        self.closed = true;
        Ok(())
    }
}

/// Configuration for the file-backed scalar log.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub log_dir: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            log_dir: PathBuf::from("runs"),
        }
    }
}

/// Buffered CSV scalar log (`tag,step,value,wall_time`), one directory per run.
pub struct ScalarWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    error: Option<csv::Error>,
}

impl ScalarWriter {
    /// Create a writer in a fresh run directory named after the local start time.
    pub fn create(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let run_name = Local::now().format("%b%d_%H-%M-%S").to_string();
        Self::create_in(&config.log_dir.join(run_name))
    }

    pub fn create_in(dir: &Path) -> Result<Self, MetricsError> {
        let path = dir.join("scalars.csv");
        let create = |e| MetricsError::Create {
            path: path.clone(),
            source: e,
        };
        fs::create_dir_all(dir).map_err(create)?;
        let file = File::create(&path).map_err(create)?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["tag", "step", "value", "wall_time"])?;
        tracing::debug!(path = %path.display(), "metrics log created");

        Ok(ScalarWriter {
            path,
            writer: Some(writer),
            error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for ScalarWriter {
    fn record(&mut self, tag: &str, value: f64, step: usize) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if self.error.is_some() {
            return;
        }
        let wall_time = Local::now().timestamp_millis() as f64 / 1000.0;
        let record = [
            tag.to_string(),
            step.to_string(),
            value.to_string(),
            format!("{wall_time:.3}"),
        ];
        if let Err(e) = writer.write_record(&record) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to write metric");
            self.error = Some(e);
        }
    }

    fn close(&mut self) -> Result<(), MetricsError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        match self.error.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Losses accumulated since the last periodic report.
#[derive(Debug, Clone)]
pub struct LossWindow {
    losses: VecDeque<f32>,
    interval: usize,
}

impl LossWindow {
    pub fn new(interval: usize) -> Self {
        let interval = interval.max(1);
        LossWindow {
            losses: VecDeque::with_capacity(interval),
            interval,
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn push(&mut self, loss: f32) {
        self.losses.push_back(loss);
        if self.losses.len() > self.interval {
            self.losses.pop_front();
        }
    }

    /// Mean of the buffered losses; empties the window.
    pub fn take_mean(&mut self) -> Option<f64> {
        let n = self.losses.len();
        if n == 0 {
            return None;
        }
        let sum: f64 = self.losses.drain(..).map(|l| l as f64).sum();
        Some(sum / n as f64)
    }
}
