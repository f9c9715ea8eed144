use crate::checkpoint::{CheckpointBundle, CheckpointStore, CheckpointStoreConfig, DateBucket};
use crate::data::BatchSource;
use crate::error::TrainingError;
use crate::model::{Classifier, LossFn, Optimizer};
use crate::training::metrics::{MetricsConfig, MetricsSink, ScalarWriter};
use crate::training::phase::{run_phase, Phase, StepProgress};

pub const TRAIN_PRECISION_TAG: &str = "Train/Precision";
pub const VALID_PRECISION_TAG: &str = "Valid/Precision";

/// Trainer configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub epochs: usize,
    /// Accuracy gain, in percentage points, required to promote a checkpoint.
    pub promotion_margin: f64,
    pub loss_log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            epochs: 30,
            promotion_margin: 0.03,
            loss_log_interval: 5,
        }
    }
}

/// Mutable state carried across the epochs of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    max_precision: f64,
    latest_version: u32,
    pending_promotion: bool,
    active_date_bucket: Option<DateBucket>,
    progress: StepProgress,
}

impl RunState {
    pub fn new(loss_log_interval: usize) -> Self {
        RunState {
            max_precision: 0.0,
            latest_version: 0,
            pending_promotion: false,
            active_date_bucket: None,
            progress: StepProgress::new(loss_log_interval),
        }
    }

    pub fn max_precision(&self) -> f64 {
        self.max_precision
    }

    pub fn latest_version(&self) -> u32 {
        self.latest_version
    }

    pub fn active_date_bucket(&self) -> Option<&DateBucket> {
        self.active_date_bucket.as_ref()
    }

    pub fn train_steps(&self) -> usize {
        self.progress.step()
    }

    pub fn should_promote(&self, train_accuracy: f64, margin: f64) -> bool {
        train_accuracy >= self.max_precision + margin
    }

    /// Record a promotion and return where its checkpoint belongs.
    ///
    /// The date bucket is taken from `date_source` on the first promotion
    /// only; later promotions in the same run reuse it.
    pub fn promote(
        &mut self,
        train_accuracy: f64,
        date_source: fn() -> DateBucket,
    ) -> (DateBucket, u32) {
        self.max_precision = train_accuracy;
        self.latest_version += 1;
        self.pending_promotion = true;
        let bucket = self.active_date_bucket.get_or_insert_with(date_source).clone();
        (bucket, self.latest_version)
    }

    /// Checkpoint promoted in the current epoch and not yet validated.
    pub fn pending_checkpoint(&self) -> Option<(&DateBucket, u32)> {
        if !self.pending_promotion {
            return None;
        }
        self.active_date_bucket
            .as_ref()
            .map(|bucket| (bucket, self.latest_version))
    }
}

/// The training and validation streams of a run.
pub struct PhaseStreams<S> {
    pub train: S,
    pub valid: S,
}

/// Final state of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub epochs: usize,
    pub train_steps: usize,
    pub max_precision: f64,
    pub latest_version: u32,
    pub date_bucket: Option<DateBucket>,
    pub train_accuracies: Vec<f64>,
    /// Epochs whose training accuracy produced a new checkpoint.
    pub promoted_epochs: Vec<usize>,
    /// `(version, accuracy)` for every validated checkpoint.
    pub validations: Vec<(u32, f64)>,
}

/// Epoch driver: train, promote on improvement, validate the promoted checkpoint.
pub struct Trainer {
    config: TrainerConfig,
    store: CheckpointStore,
    date_source: fn() -> DateBucket,
}

impl Trainer {
    pub fn new(config: TrainerConfig, store: CheckpointStore) -> Self {
        Trainer {
            config,
            store,
            date_source: DateBucket::today,
        }
    }

    /// Replace the clock used to name the run's checkpoint directory.
    pub fn with_date_source(mut self, date_source: fn() -> DateBucket) -> Self {
        self.date_source = date_source;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run the full training loop. The sink is closed whether or not the
    /// run succeeds.
    pub fn train<M, L, O, S, K>(
        &self,
        model: &mut M,
        streams: &mut PhaseStreams<S>,
        loss_fn: &L,
        optim: &mut O,
        sink: &mut K,
    ) -> Result<RunSummary, TrainingError>
    where
        M: Classifier,
        L: LossFn<M>,
        O: Optimizer<M>,
        S: BatchSource<Input = M::Input>,
        K: MetricsSink + ?Sized,
    {
        let result = self.run_epochs(model, streams, loss_fn, optim, sink);
        let closed = sink.close();

        match (result, closed) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "failed to close metrics sink");
                }
                Err(e)
            }
        }
    }

    fn run_epochs<M, L, O, S, K>(
        &self,
        model: &mut M,
        streams: &mut PhaseStreams<S>,
        loss_fn: &L,
        optim: &mut O,
        sink: &mut K,
    ) -> Result<RunSummary, TrainingError>
    where
        M: Classifier,
        L: LossFn<M>,
        O: Optimizer<M>,
        S: BatchSource<Input = M::Input>,
        K: MetricsSink + ?Sized,
    {
        let mut state = RunState::new(self.config.loss_log_interval);
        let mut train_accuracies = Vec::with_capacity(self.config.epochs);
        let mut promoted_epochs = Vec::new();
        let mut validations = Vec::new();

        tracing::info!(
            epochs = self.config.epochs,
            store = %self.store.root_dir().display(),
            "starting training"
        );

        for epoch in 0..self.config.epochs {
            tracing::info!(
                epoch,
                learning_rate = optim.learning_rate(),
                "train phase"
            );
            let train = run_phase(
                Phase::Train,
                &mut streams.train,
                model,
                loss_fn,
                optim,
                &mut state.progress,
                sink,
            )?;
            let accuracy = train.accuracy_percent;
            train_accuracies.push(accuracy);

            if state.should_promote(accuracy, self.config.promotion_margin) {
                let previous = state.max_precision();
                let (bucket, version) = state.promote(accuracy, self.date_source);
                let bundle = CheckpointBundle::new(
                    version,
                    bucket.clone(),
                    accuracy,
                    model.parameters_state()?,
                    optim.state()?,
                );
                let path = self.store.promote(&bundle, &bucket, version)?;
                promoted_epochs.push(epoch);
                tracing::info!(
                    epoch,
                    version,
                    previous,
                    accuracy,
                    path = %path.display(),
                    "promoted checkpoint"
                );
            }

            sink.record(TRAIN_PRECISION_TAG, accuracy, epoch);

            let validated =
                self.validate_pending(&mut state, model, streams, loss_fn, optim, sink)?;
            if let Some(accuracy) = validated {
                validations.push((state.latest_version(), accuracy));
            }
        }

        let summary = RunSummary {
            epochs: self.config.epochs,
            train_steps: state.train_steps(),
            max_precision: state.max_precision(),
            latest_version: state.latest_version(),
            date_bucket: state.active_date_bucket().cloned(),
            train_accuracies,
            promoted_epochs,
            validations,
        };
        tracing::info!(
            max_precision = summary.max_precision,
            latest_version = summary.latest_version,
            train_steps = summary.train_steps,
            "training complete"
        );
        Ok(summary)
    }

    /// Reload the checkpoint promoted this epoch from disk and validate it.
    fn validate_pending<M, L, O, S, K>(
        &self,
        state: &mut RunState,
        model: &mut M,
        streams: &mut PhaseStreams<S>,
        loss_fn: &L,
        optim: &mut O,
        sink: &mut K,
    ) -> Result<Option<f64>, TrainingError>
    where
        M: Classifier,
        L: LossFn<M>,
        O: Optimizer<M>,
        S: BatchSource<Input = M::Input>,
        K: MetricsSink + ?Sized,
    {
        let Some((bucket, version)) = state.pending_checkpoint() else {
            return Ok(None);
        };

        let bundle = self.store.load(bucket, version)?;
        model.load_parameters_state(bundle.model_parameters())?;

        let valid = run_phase(
            Phase::Valid,
            &mut streams.valid,
            model,
            loss_fn,
            optim,
            &mut state.progress,
            sink,
        )?;
        sink.record(VALID_PRECISION_TAG, valid.accuracy_percent, version as usize);
        state.pending_promotion = false;

        tracing::info!(version, accuracy = valid.accuracy_percent, "validated checkpoint");
        Ok(Some(valid.accuracy_percent))
    }
}

/// Train with the default checkpoint root and a fresh scalar log under the
/// default log directory.
pub fn run_training<M, L, O, S>(
    model: &mut M,
    streams: &mut PhaseStreams<S>,
    loss_fn: &L,
    optim: &mut O,
    epochs: usize,
) -> Result<RunSummary, TrainingError>
where
    M: Classifier,
    L: LossFn<M>,
    O: Optimizer<M>,
    S: BatchSource<Input = M::Input>,
{
    let config = TrainerConfig {
        epochs,
        ..TrainerConfig::default()
    };
    let trainer = Trainer::new(config, CheckpointStore::new(CheckpointStoreConfig::default()));
    let mut sink = ScalarWriter::create(&MetricsConfig::default())?;
    trainer.train(model, streams, loss_fn, optim, &mut sink)
}
