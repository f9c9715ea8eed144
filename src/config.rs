use std::path::{Path, PathBuf};

use crate::checkpoint::CheckpointStoreConfig;
use crate::error::ConfigError;
use crate::training::metrics::MetricsConfig;
use crate::training::trainer::TrainerConfig;

/// Which layers receive gradient updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainableLayers {
    #[default]
    All,
    /// Freeze the convolutional backbone; only the classification head trains.
    HeadOnly,
}

/// Classifier shape and regularization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub num_classes: usize,
    pub channels: usize,
    pub frames: usize,
    pub height: usize,
    pub width: usize,
    pub hidden_channels: usize,
    pub dropout: f64,
    pub trainable_layers: TrainableLayers,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            num_classes: 2,
            channels: 3,
            frames: 8,
            height: 112,
            width: 112,
            hidden_channels: 16,
            dropout: 0.5,
            trainable_layers: TrainableLayers::All,
        }
    }
}

/// Location of the `train/` and `valid/` clip splits and how they are batched.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    pub batch_size: usize,
    /// Seed for per-pass shuffling of the training clips.
    pub shuffle_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            root: PathBuf::from("RWF-2000"),
            batch_size: 8,
            shuffle_seed: 42,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            learning_rate: 1e-4,
        }
    }
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainerConfig,
    pub optimizer: OptimizerConfig,
    pub checkpoint: CheckpointStoreConfig,
    pub metrics: MetricsConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.training.epochs == 0 {
            return Err(ConfigError::Validation(
                "training.epochs must be > 0".into(),
            ));
        }
        if self.optimizer.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "optimizer.learning_rate must be > 0".into(),
            ));
        }
        if self.data.batch_size == 0 {
            return Err(ConfigError::Validation(
                "data.batch_size must be > 0".into(),
            ));
        }
        if self.training.promotion_margin < 0.0 {
            return Err(ConfigError::Validation(
                "training.promotion_margin must be >= 0".into(),
            ));
        }
        if self.training.loss_log_interval == 0 {
            return Err(ConfigError::Validation(
                "training.loss_log_interval must be > 0".into(),
            ));
        }

        let model = &self.model;
        if model.num_classes < 2 {
            return Err(ConfigError::Validation(
                "model.num_classes must be >= 2".into(),
            ));
        }
        let dims = [
            ("channels", model.channels),
            ("frames", model.frames),
            ("height", model.height),
            ("width", model.width),
            ("hidden_channels", model.hidden_channels),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!("model.{name} must be > 0")));
        }
        if !(0.0..1.0).contains(&model.dropout) {
            return Err(ConfigError::Validation(
                "model.dropout must be in [0, 1)".into(),
            ));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_defaults_follow_training_script() {
        let config = AppConfig::default();
        assert_eq!(config.training.epochs, 30);
        assert_eq!(config.data.batch_size, 8);
        assert_eq!(config.data.shuffle_seed, 42);
        assert_eq!(config.training.loss_log_interval, 5);
        assert!((config.optimizer.learning_rate - 1e-4).abs() < 1e-12);
        assert!((config.training.promotion_margin - 0.03).abs() < 1e-12);
        assert_eq!(config.checkpoint.root_dir, PathBuf::from("models"));
        assert_eq!(config.model.frames, 8);
        assert_eq!(config.model.trainable_layers, TrainableLayers::All);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[optimizer]
learning_rate = 0.001

[model]
trainable_layers = "head_only"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!((config.optimizer.learning_rate - 0.001).abs() < 1e-9);
        assert_eq!(config.model.trainable_layers, TrainableLayers::HeadOnly);
        // Other fields should be defaults
        assert_eq!(config.training.epochs, 30);
        assert_eq!(config.model.num_classes, 2);
        assert_eq!(config.data.root, PathBuf::from("RWF-2000"));
    }

    #[test]
    fn test_batching_and_optimizer_sections() {
        let toml_str = r#"
[data]
batch_size = 4
shuffle_seed = 7

[optimizer]
learning_rate = 0.01
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data.batch_size, 4);
        assert_eq!(config.data.shuffle_seed, 7);
        assert!((config.optimizer.learning_rate - 0.01).abs() < 1e-12);

        // The loop section only carries what the trainer reads.
        let training = toml::to_string(&config.training).unwrap();
        assert!(!training.contains("learning_rate"));
        assert!(!training.contains("batch_size"));
        assert!(!training.contains("shuffle_seed"));
    }

    #[test]
    fn test_unknown_trainable_layers_rejected() {
        let err = toml::from_str::<AppConfig>("[model]\ntrainable_layers = \"fc\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_validation_rejects_zero_epochs() {
        let mut config = AppConfig::default();
        config.training.epochs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_lr() {
        let mut config = AppConfig::default();
        config.optimizer.learning_rate = -0.001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_batch_size() {
        let mut config = AppConfig::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_margin() {
        let mut config = AppConfig::default();
        config.training.promotion_margin = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_allows_zero_margin() {
        let mut config = AppConfig::default();
        config.training.promotion_margin = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_loss_interval() {
        let mut config = AppConfig::default();
        config.training.loss_log_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_single_class() {
        let mut config = AppConfig::default();
        config.model.num_classes = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_names_zero_dimension() {
        let mut config = AppConfig::default();
        config.model.frames = 0;
        match config.validate() {
            Err(ConfigError::Validation(msg)) => assert_eq!(msg, "model.frames must be > 0"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_dropout_of_one() {
        let mut config = AppConfig::default();
        config.model.dropout = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.training.epochs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[training]
epochs = 3

[checkpoint]
root_dir = "ckpts"
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.checkpoint.root_dir, PathBuf::from("ckpts"));
        // Others are defaults
        assert!((config.optimizer.learning_rate - 1e-4).abs() < 1e-9);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[training]\nepochs = 0\n").unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[training\n").unwrap();

        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml().unwrap();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
    }
}
