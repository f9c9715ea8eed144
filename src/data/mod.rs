//! Batch sources consumed by the training loop.

mod batch;
mod clips;

pub use batch::{Batch, BatchSource, VecSource};
pub use clips::{ClipBatcher, ClipDataset, ClipEntry, ClipItem, ClipLoader, ClipManifest};
