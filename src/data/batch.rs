use crate::error::DataError;

/// Inputs for a batch of examples with their integral class labels.
#[derive(Debug, Clone)]
pub struct Batch<I> {
    pub input: I,
    pub labels: Vec<usize>,
}

/// A finite stream of batches that can be replayed once per phase.
pub trait BatchSource {
    type Input;

    /// Start a new pass over the source.
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch<Self::Input>, DataError>> + '_>;
}

/// In-memory source replaying the same batches on every pass.
#[derive(Debug, Clone)]
pub struct VecSource<I> {
    batches: Vec<Batch<I>>,
}

impl<I> VecSource<I> {
    pub fn new(batches: Vec<Batch<I>>) -> Self {
        VecSource { batches }
    }
}

impl<I: Clone> BatchSource for VecSource<I> {
    type Input = I;

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch<I>, DataError>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}
