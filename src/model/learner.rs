use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;

use crate::config::{ModelConfig, TrainableLayers};
use crate::error::{CheckpointError, ComputeError};
use crate::model::network::{VideoNetwork, VideoNetworkConfig};
use crate::model::{Classifier, LossFn, Optimizer};
use crate::training::Phase;

type SnapshotRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// [`VideoNetwork`] wrapped with phase handling and parameter snapshots.
pub struct VideoClassifier<B: AutodiffBackend> {
    network: VideoNetwork<B>,
    inference: Option<VideoNetwork<B::InnerBackend>>,
    clip_shape: [usize; 4],
    trainable_layers: TrainableLayers,
    phase: Phase,
    device: B::Device,
}

impl<B: AutodiffBackend> VideoClassifier<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let network = VideoNetworkConfig::new(config.num_classes)
            .with_channels(config.channels)
            .with_hidden_channels(config.hidden_channels)
            .with_dropout(config.dropout)
            .init(device);
        let network = match config.trainable_layers {
            TrainableLayers::All => network,
            TrainableLayers::HeadOnly => network.freeze_backbone(),
        };

        VideoClassifier {
            network,
            inference: None,
            clip_shape: [config.channels, config.frames, config.height, config.width],
            trainable_layers: config.trainable_layers,
            phase: Phase::Train,
            device: device.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn network(&self) -> &VideoNetwork<B> {
        &self.network
    }

    fn check_input(&self, dims: [usize; 5]) -> Result<(), ComputeError> {
        let [batch, c, t, h, w] = dims;
        if batch == 0 || [c, t, h, w] != self.clip_shape {
            let mut expected = vec![batch.max(1)];
            expected.extend_from_slice(&self.clip_shape);
            return Err(ComputeError::ShapeMismatch {
                expected,
                actual: dims.to_vec(),
            });
        }
        Ok(())
    }
}

impl<B: AutodiffBackend> Classifier for VideoClassifier<B> {
    type Input = Tensor<B, 5>;
    type Scores = Tensor<B, 2>;
    type Loss = Tensor<B, 1>;

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.inference = match phase {
            Phase::Train => None,
            Phase::Valid => Some(self.network.valid()),
        };
    }

    fn forward(&self, input: Tensor<B, 5>) -> Result<Tensor<B, 2>, ComputeError> {
        self.check_input(input.dims())?;
        let scores = match (&self.inference, self.phase) {
            (Some(inference), Phase::Valid) => {
                Tensor::from_inner(inference.forward(input.inner()))
            }
            (None, Phase::Valid) => {
                Tensor::from_inner(self.network.valid().forward(input.inner()))
            }
            (_, Phase::Train) => self.network.forward(input),
        };
        Ok(scores)
    }

    fn predict(&self, scores: &Tensor<B, 2>) -> Result<Vec<usize>, ComputeError> {
        let [_, classes] = scores.dims();
        if classes == 0 {
            return Err(ComputeError::Backend("scores have no classes".into()));
        }
        let values: Vec<f32> = scores
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| ComputeError::Backend(format!("{e:?}")))?;

        Ok(values.chunks(classes).map(argmax).collect())
    }

    fn parameters_state(&self) -> Result<Vec<u8>, CheckpointError> {
        let record = self.network.clone().into_record();
        <SnapshotRecorder as Recorder<B>>::record(&SnapshotRecorder::default(), record, ())
            .map_err(|e| CheckpointError::Record(e.to_string()))
    }

    fn load_parameters_state(&mut self, state: &[u8]) -> Result<(), CheckpointError> {
        let record = <SnapshotRecorder as Recorder<B>>::load(
            &SnapshotRecorder::default(),
            state.to_vec(),
            &self.device,
        )
        .map_err(|e| CheckpointError::Record(e.to_string()))?;

        let network = self.network.clone().load_record(record);
        self.network = match self.trainable_layers {
            TrainableLayers::All => network,
            TrainableLayers::HeadOnly => network.freeze_backbone(),
        };
        if self.inference.is_some() {
            self.inference = Some(self.network.valid());
        }
        Ok(())
    }
}

/// Index of the largest score; ties resolve to the lowest index.
fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Cross-entropy over class scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl<B: AutodiffBackend> LossFn<VideoClassifier<B>> for CrossEntropy {
    fn compute(&self, scores: Tensor<B, 2>, labels: &[usize]) -> Result<Tensor<B, 1>, ComputeError> {
        let [batch, classes] = scores.dims();
        if labels.len() != batch {
            return Err(ComputeError::LabelCount {
                predictions: batch,
                labels: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= classes) {
            return Err(ComputeError::LabelOutOfRange {
                label,
                num_classes: classes,
            });
        }

        let device = scores.device();
        let targets: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::from(targets.as_slice()), &device);
        Ok(CrossEntropyLossConfig::new().init(&device).forward(scores, targets))
    }
}

/// Adam over a [`VideoClassifier`], holding gradients between backward and step.
pub struct AdamOptimizer<B: AutodiffBackend> {
    optim: OptimizerAdaptor<Adam, VideoNetwork<B>, B>,
    learning_rate: f64,
    grads: Option<GradientsParams>,
}

impl<B: AutodiffBackend> AdamOptimizer<B> {
    pub fn new(learning_rate: f64) -> Self {
        AdamOptimizer {
            optim: AdamConfig::new().with_epsilon(1e-8).init(),
            learning_rate,
            grads: None,
        }
    }
}

impl<B: AutodiffBackend> Optimizer<VideoClassifier<B>> for AdamOptimizer<B> {
    fn zero_grad(&mut self) {
        self.grads = None;
    }

    fn backward(
        &mut self,
        model: &VideoClassifier<B>,
        loss: Tensor<B, 1>,
    ) -> Result<f32, ComputeError> {
        let value = loss.clone().into_scalar().elem::<f32>();
        let grads = loss.backward();
        self.grads = Some(GradientsParams::from_grads(grads, &model.network));
        Ok(value)
    }

    fn step(&mut self, model: &mut VideoClassifier<B>) -> Result<(), ComputeError> {
        let grads = self.grads.take().ok_or(ComputeError::MissingGradients)?;
        model.network = self
            .optim
            .step(self.learning_rate, model.network.clone(), grads);
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn state(&self) -> Result<Vec<u8>, CheckpointError> {
        let record = self.optim.to_record();
        <SnapshotRecorder as Recorder<B>>::record(&SnapshotRecorder::default(), record, ())
            .map_err(|e| CheckpointError::Record(e.to_string()))
    }
}
