#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clip_trainer::checkpoint::CheckpointStore;
use clip_trainer::config::AppConfig;
use clip_trainer::data::{ClipDataset, ClipLoader};
use clip_trainer::model::{AdamOptimizer, CrossEntropy, VideoClassifier};
use clip_trainer::training::{Phase, PhaseStreams, ScalarWriter, Trainer};

#[cfg(not(feature = "wgpu"))]
type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Train a video clip classifier, promoting checkpoints that improve
/// training accuracy.
#[derive(Parser)]
#[command(name = "train", about = "Train a video clip classifier")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the dataset root (expects train/ and valid/ splits)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Override number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", AppConfig::default_toml().context("serializing default config")?);
        return Ok(());
    }

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    if let Some(root) = cli.data_root {
        app_config.data.root = root;
    }
    if let Some(epochs) = cli.epochs {
        app_config.training.epochs = epochs;
    }
    if let Some(lr) = cli.lr {
        app_config.optimizer.learning_rate = lr;
    }
    app_config.validate().context("validating overridden config")?;

    let device: <TrainBackend as Backend>::Device = Default::default();
    let data = &app_config.data;

    let open = |phase: Phase| {
        let root = &app_config.data.root;
        ClipDataset::open(root, phase)
            .with_context(|| format!("opening {phase} split under {}", root.display()))
    };
    let mut streams = PhaseStreams {
        train: ClipLoader::<TrainBackend>::new(
            open(Phase::Train)?,
            data.batch_size,
            device.clone(),
            Some(data.shuffle_seed),
        ),
        valid: ClipLoader::<TrainBackend>::new(
            open(Phase::Valid)?,
            data.batch_size,
            device.clone(),
            None,
        ),
    };

    let mut model = VideoClassifier::<TrainBackend>::new(&app_config.model, &device);
    let mut optim = AdamOptimizer::<TrainBackend>::new(app_config.optimizer.learning_rate);
    let mut sink = ScalarWriter::create(&app_config.metrics).context("creating metrics log")?;
    tracing::info!(path = %sink.path().display(), "writing scalars");

    let trainer = Trainer::new(
        app_config.training.clone(),
        CheckpointStore::new(app_config.checkpoint.clone()),
    );
    let summary = trainer
        .train(&mut model, &mut streams, &CrossEntropy, &mut optim, &mut sink)
        .context("training run failed")?;

    println!("-------------------------------------------");
    println!("Training complete. Epochs: {}", summary.epochs);
    println!("Best train accuracy: {:.2}%", summary.max_precision);
    match &summary.date_bucket {
        Some(bucket) => println!(
            "Latest checkpoint: {}",
            trainer.store().path_for(bucket, summary.latest_version).display()
        ),
        None => println!("No checkpoint promoted"),
    }
    for (version, accuracy) in &summary.validations {
        println!("  model{version}: valid accuracy {accuracy:.2}%");
    }
    Ok(())
}
