use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::data::{Batch, BatchSource};
use crate::error::DataError;
use crate::training::Phase;

const MANIFEST_FILE: &str = "manifest.json";

/// Index of the pre-decoded clips for one phase.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClipManifest {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub classes: usize,
    pub clips: Vec<ClipEntry>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClipEntry {
    /// Path of the raw clip, relative to the manifest directory.
    pub file: PathBuf,
    pub label: usize,
}

impl ClipManifest {
    /// Number of `f32` values in one clip, `[C, T, H, W]`.
    pub fn clip_len(&self) -> usize {
        self.channels * self.frames * self.height * self.width
    }

    pub fn clip_shape(&self) -> [usize; 4] {
        [self.channels, self.frames, self.height, self.width]
    }
}

/// One decoded clip, `[C, T, H, W]` values in row-major order.
#[derive(Debug, Clone)]
pub struct ClipItem {
    pub values: Vec<f32>,
    pub label: usize,
}

/// Clips stored as raw little-endian `f32` files under `<root>/<phase>/`.
#[derive(Debug, Clone)]
pub struct ClipDataset {
    dir: PathBuf,
    manifest: ClipManifest,
}

impl ClipDataset {
    /// Open the `train` or `valid` split under `root`.
    ///
    /// Every clip file is checked for existence and size up front so that
    /// batching only fails if the files change afterwards.
    pub fn open(root: &Path, phase: Phase) -> Result<Self, DataError> {
        let dir = root.join(phase.to_string());
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| DataError::Read {
            path: path.clone(),
            source: e,
        })?;
        let manifest: ClipManifest =
            serde_json::from_str(&content).map_err(|e| DataError::Manifest {
                path: path.clone(),
                source: e,
            })?;

        let expected = manifest.clip_len();
        for entry in &manifest.clips {
            let clip_path = dir.join(&entry.file);
            if entry.label >= manifest.classes {
                return Err(DataError::Label {
                    path: clip_path,
                    label: entry.label,
                    classes: manifest.classes,
                });
            }
            let bytes = fs::metadata(&clip_path)
                .map_err(|e| DataError::Read {
                    path: clip_path.clone(),
                    source: e,
                })?
                .len() as usize;
            if bytes != expected * 4 {
                return Err(DataError::ClipSize {
                    path: clip_path,
                    expected,
                    actual: bytes / 4,
                });
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            clips = manifest.clips.len(),
            "clip dataset opened"
        );
        Ok(ClipDataset { dir, manifest })
    }

    pub fn manifest(&self) -> &ClipManifest {
        &self.manifest
    }

    /// Read clip `index` from disk.
    pub fn read_clip(&self, index: usize) -> Result<ClipItem, DataError> {
        let entry = self
            .manifest
            .clips
            .get(index)
            .ok_or(DataError::MissingClip {
                index,
                len: self.manifest.clips.len(),
            })?;
        let path = self.dir.join(&entry.file);
        let bytes = fs::read(&path).map_err(|e| DataError::Read {
            path: path.clone(),
            source: e,
        })?;

        let expected = self.manifest.clip_len();
        if bytes.len() != expected * 4 {
            return Err(DataError::ClipSize {
                path,
                expected,
                actual: bytes.len() / 4,
            });
        }

        let values = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(ClipItem {
            values,
            label: entry.label,
        })
    }
}

impl Dataset<ClipItem> for ClipDataset {
    fn get(&self, index: usize) -> Option<ClipItem> {
        match self.read_clip(index) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!(error = %e, index, "failed to read clip");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.manifest.clips.len()
    }
}

/// Stacks clips into a `[batch, C, T, H, W]` tensor.
#[derive(Debug, Clone)]
pub struct ClipBatcher {
    clip_shape: [usize; 4],
}

impl ClipBatcher {
    pub fn new(clip_shape: [usize; 4]) -> Self {
        ClipBatcher { clip_shape }
    }
}

impl<B: Backend> Batcher<B, ClipItem, Batch<Tensor<B, 5>>> for ClipBatcher {
    fn batch(&self, items: Vec<ClipItem>, device: &B::Device) -> Batch<Tensor<B, 5>> {
        let [c, t, h, w] = self.clip_shape;
        let batch_size = items.len();
        let labels = items.iter().map(|item| item.label).collect();
        let values: Vec<f32> = items.into_iter().flat_map(|item| item.values).collect();

        let input = Tensor::from_data(TensorData::new(values, [batch_size, c, t, h, w]), device);
        Batch { input, labels }
    }
}

/// Burn data loader over a [`ClipDataset`], exposed as a [`BatchSource`].
pub struct ClipLoader<B: Backend> {
    loader: Arc<dyn DataLoader<B, Batch<Tensor<B, 5>>>>,
    clips: usize,
}

impl<B: Backend> ClipLoader<B> {
    /// `shuffle_seed: None` keeps manifest order on every pass.
    pub fn new(
        dataset: ClipDataset,
        batch_size: usize,
        device: B::Device,
        shuffle_seed: Option<u64>,
    ) -> Self {
        let clips = dataset.len();
        let batcher = ClipBatcher::new(dataset.manifest().clip_shape());
        let mut builder = DataLoaderBuilder::<B, ClipItem, Batch<Tensor<B, 5>>>::new(batcher)
            .batch_size(batch_size.max(1))
            .set_device(device);
        if let Some(seed) = shuffle_seed {
            builder = builder.shuffle(seed);
        }

        ClipLoader {
            loader: builder.build(dataset),
            clips,
        }
    }
}

impl<B: Backend> BatchSource for ClipLoader<B> {
    type Input = Tensor<B, 5>;

    /// A pass that yields fewer clips than the dataset holds ends with
    /// [`DataError::Incomplete`].
    fn batches(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Batch<Tensor<B, 5>>, DataError>> + '_> {
        let expected = self.clips;
        let mut seen = 0usize;
        let mut done = false;
        let mut iter = self.loader.iter();

        Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            match iter.next() {
                Some(batch) => {
                    seen += batch.labels.len();
                    Some(Ok(batch))
                }
                None => {
                    done = true;
                    (seen < expected).then_some(Err(DataError::Incomplete {
                        expected,
                        actual: seen,
                    }))
                }
            }
        }))
    }
}
