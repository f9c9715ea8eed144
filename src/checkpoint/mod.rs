mod bundle;
mod store;

pub use bundle::{CheckpointBundle, DateBucket};
pub use store::{CheckpointStore, CheckpointStoreConfig};
