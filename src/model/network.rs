use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig3d, Relu};
use burn::prelude::*;

/// 3D-convolutional clip classifier.
///
/// ```text
/// Input:   [batch, C, T, H, W]
/// Conv1:   C -> hidden, 3x3x3, stride 1, pad 1   =>  [batch, hidden, T, H, W]
/// ReLU
/// Conv2:   hidden -> 2*hidden, 3x3x3, stride 2   =>  [batch, 2*hidden, T/2, H/2, W/2]
/// ReLU
/// Global average pool over T, H, W             =>  [batch, 2*hidden]
/// Dropout
/// Head:    2*hidden -> num_classes              =>  [batch, num_classes]
/// ```
#[derive(Module, Debug)]
pub struct VideoNetwork<B: Backend> {
    conv1: Conv3d<B>,
    conv2: Conv3d<B>,
    dropout: Dropout,
    head: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct VideoNetworkConfig {
    pub num_classes: usize,
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 16)]
    pub hidden_channels: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl VideoNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> VideoNetwork<B> {
        let hidden = self.hidden_channels;
        VideoNetwork {
            conv1: Conv3dConfig::new([self.channels, hidden], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            conv2: Conv3dConfig::new([hidden, hidden * 2], [3, 3, 3])
                .with_stride([2, 2, 2])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            head: LinearConfig::new(hidden * 2, self.num_classes).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> VideoNetwork<B> {
    /// Forward pass: input [batch, C, T, H, W] -> class scores [batch, num_classes].
    pub fn forward(&self, input: Tensor<B, 5>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.conv1.forward(input));
        let x = self.relu.forward(self.conv2.forward(x));

        let [batch_size, features, _, _, _] = x.dims();
        let x = x.mean_dim(4).mean_dim(3).mean_dim(2).reshape([batch_size, features]);

        self.head.forward(self.dropout.forward(x))
    }

    /// Stop gradient tracking for the convolutional backbone; only the head trains.
    pub fn freeze_backbone(mut self) -> Self {
        self.conv1 = self.conv1.no_grad();
        self.conv2 = self.conv2.no_grad();
        self
    }

    /// Whether the convolutional weights are excluded from gradient tracking.
    pub fn is_backbone_frozen(&self) -> bool {
        !self.conv1.weight.val().is_require_grad() && !self.conv2.weight.val().is_require_grad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_network_output_shape() {
        let device = Default::default();
        let network = VideoNetworkConfig::new(2)
            .with_hidden_channels(4)
            .init::<TestBackend>(&device);

        let input = Tensor::zeros([2, 3, 4, 8, 8], &device);
        let output = network.forward(input);
        assert_eq!(output.shape().dims, [2, 2]);
    }

    #[test]
    fn test_freeze_backbone_keeps_head_trainable() {
        type AutodiffBackend = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();
        let network = VideoNetworkConfig::new(2)
            .with_hidden_channels(2)
            .init::<AutodiffBackend>(&device);
        assert!(!network.is_backbone_frozen());

        let network = network.freeze_backbone();
        assert!(network.is_backbone_frozen());
        assert!(network.head.weight.val().is_require_grad());
    }

    #[test]
    fn test_network_odd_clip_dims() {
        let device = Default::default();
        let network = VideoNetworkConfig::new(5)
            .with_channels(1)
            .with_hidden_channels(2)
            .init::<TestBackend>(&device);

        let input = Tensor::zeros([1, 1, 3, 7, 5], &device);
        let output = network.forward(input);
        assert_eq!(output.shape().dims, [1, 5]);
    }
}
