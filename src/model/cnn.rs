//! CNN Model Architecture for Digit Classification
//!
//! A small two-stage convolutional network over 28×28 single-channel images.
//! The layer layout mirrors the checkpoints it is trained into, so the stage
//! ordering and the dimensions here must not drift.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::DigitError;
use crate::{INPUT_SIZE, NUM_CLASSES};

/// Configuration for the DigitClassifier CNN model
#[derive(Config, Debug)]
pub struct DigitClassifierConfig {
    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Filters in the first convolution
    #[config(default = "32")]
    pub conv1_channels: usize,

    /// Filters in the second convolution
    #[config(default = "64")]
    pub conv2_channels: usize,

    /// Width of the hidden fully-connected layer
    #[config(default = "128")]
    pub hidden_size: usize,
}

impl DigitClassifierConfig {
    /// Spatial size of the feature map entering the classifier head.
    ///
    /// 28 -> pool -> 14 -> 3×3 valid conv -> 12 -> pool -> 6
    pub fn feature_map_size(&self) -> usize {
        (INPUT_SIZE / 2 - 2) / 2
    }

    /// Length of the flattened feature vector (64 × 6 × 6 = 2304 by default)
    pub fn flattened_size(&self) -> usize {
        let side = self.feature_map_size();
        self.conv2_channels * side * side
    }

    /// Parameter shapes in Burn layout, keyed by record path.
    ///
    /// Linear weights are stored `[d_input, d_output]`.
    pub fn expected_shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("conv1.weight", vec![self.conv1_channels, 1, 3, 3]),
            ("conv1.bias", vec![self.conv1_channels]),
            (
                "conv2.weight",
                vec![self.conv2_channels, self.conv1_channels, 3, 3],
            ),
            ("conv2.bias", vec![self.conv2_channels]),
            ("fc1.weight", vec![self.flattened_size(), self.hidden_size]),
            ("fc1.bias", vec![self.hidden_size]),
            ("fc2.weight", vec![self.hidden_size, self.num_classes]),
            ("fc2.bias", vec![self.num_classes]),
        ]
    }
}

/// Digit Classifier CNN
///
/// Architecture:
/// - Conv 1→32 (3×3, padding 1), ReLU, 2×2 max-pool
/// - Conv 32→64 (3×3, no padding), ReLU, 2×2 max-pool
/// - Flatten to 2304
/// - Linear 2304→128, then Linear 128→10 with no activation in between
#[derive(Module, Debug)]
pub struct DigitClassifier<B: Backend> {
    pub conv1: Conv2d<B>,
    pub pool1: MaxPool2d,
    pub conv2: Conv2d<B>,
    pub pool2: MaxPool2d,
    pub activation: Relu,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> DigitClassifier<B> {
    /// Create a new DigitClassifier with freshly initialized weights
    pub fn new(config: &DigitClassifierConfig, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([1, config.conv1_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([config.conv1_channels, config.conv2_channels], [3, 3])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        let pool1 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let pool2 = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let fc1 = LinearConfig::new(config.flattened_size(), config.hidden_size).init(device);
        let fc2 = LinearConfig::new(config.hidden_size, config.num_classes).init(device);

        Self {
            conv1,
            pool1,
            conv2,
            pool2,
            activation: Relu::new(),
            fc1,
            fc2,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 1, 28, 28]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        // [B, 1, 28, 28] -> [B, 32, 14, 14]
        let x = self.conv1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        // [B, 32, 14, 14] -> [B, 64, 6, 6]
        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        // fc1 feeds fc2 directly: the trained weights expect no activation here
        let x = self.fc1.forward(x);
        self.fc2.forward(x)
    }

    /// Run a single-image forward pass and read the logits back to the host
    pub fn logits(&self, input: Tensor<B, 4>) -> crate::utils::error::Result<Vec<f32>> {
        let [batch_size, ..] = input.dims();
        if batch_size != 1 {
            return Err(DigitError::Internal(format!(
                "Expected a batch of one image, got {}",
                batch_size
            )));
        }

        let logits: Vec<f32> = self
            .forward(input)
            .into_data()
            .to_vec()
            .map_err(|e| DigitError::Internal(format!("Failed to read logits: {:?}", e)))?;

        if logits.len() != NUM_CLASSES {
            return Err(DigitError::Internal(format!(
                "Expected {} logits, got {}",
                NUM_CLASSES,
                logits.len()
            )));
        }

        Ok(logits)
    }
}
