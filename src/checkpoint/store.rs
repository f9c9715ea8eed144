use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoint::bundle::{CheckpointBundle, DateBucket};
use crate::error::CheckpointError;

/// Configuration for the checkpoint store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointStoreConfig {
    pub root_dir: PathBuf,
}

impl Default for CheckpointStoreConfig {
    fn default() -> Self {
        CheckpointStoreConfig {
            root_dir: PathBuf::from("models"),
        }
    }
}

/// Persists versioned checkpoint bundles under `<root>/<date_bucket>/`.
pub struct CheckpointStore {
    config: CheckpointStoreConfig,
}

impl CheckpointStore {
    pub fn new(config: CheckpointStoreConfig) -> Self {
        CheckpointStore { config }
    }

    pub fn root_dir(&self) -> &Path {
        &self.config.root_dir
    }

    /// Path of the bundle for `(date_bucket, version)`. Depends on nothing else.
    pub fn path_for(&self, date_bucket: &DateBucket, version: u32) -> PathBuf {
        self.config
            .root_dir
            .join(date_bucket.as_str())
            .join(format!("model{}.ckpt", version))
    }

    /// Write `bundle` as `version` in the `date_bucket` directory.
    pub fn promote(
        &self,
        bundle: &CheckpointBundle,
        date_bucket: &DateBucket,
        version: u32,
    ) -> Result<PathBuf, CheckpointError> {
        let final_path = self.path_for(date_bucket, version);
        let dir = self.config.root_dir.join(date_bucket.as_str());
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::Storage {
            path: dir.clone(),
            source: e,
        })?;

        let bytes = bincode::serialize(bundle)?;

        // Write then rename so a failed write never leaves a partial bundle.
        let tmp_path = final_path.with_extension("ckpt.tmp");
        fs::write(&tmp_path, bytes).map_err(|e| CheckpointError::Storage {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|e| CheckpointError::Storage {
            path: final_path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %final_path.display(), version, "checkpoint written");
        Ok(final_path)
    }

    /// Load the bundle stored for `(date_bucket, version)`.
    pub fn load(
        &self,
        date_bucket: &DateBucket,
        version: u32,
    ) -> Result<CheckpointBundle, CheckpointError> {
        let path = self.path_for(date_bucket, version);
        if !path.is_file() {
            return Err(CheckpointError::NotFound(path));
        }
        let bytes = fs::read(&path).map_err(|e| CheckpointError::Read {
            path: path.clone(),
            source: e,
        })?;
        let bundle = bincode::deserialize(&bytes)
            .map_err(|e| CheckpointError::Corrupt { path: path.clone(), source: e })?;
        tracing::debug!(path = %path.display(), version, "checkpoint loaded");
        Ok(bundle)
    }
}
