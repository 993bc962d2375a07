use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    optim::{decay::WeightDecayConfig, AdamConfig},
    prelude::*,
};
use serde::Deserialize;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, so adding them again gives conflicting impls.
#[derive(Config, Debug)]
pub struct ImageClassifierConfig {
    pub num_classes:   usize,
    pub in_channels:   usize,
    pub conv_channels: Vec<usize>,
    pub hidden_size:   usize,
    pub dropout:       f64,
}

impl ImageClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        let mut blocks = Vec::with_capacity(self.conv_channels.len());
        let mut channels = self.in_channels;
        for &out in &self.conv_channels {
            blocks.push(self.build_conv_block(channels, out, device));
            channels = out;
        }
        ImageClassifier {
            blocks,
            pool:       AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden:     LinearConfig::new(channels, self.hidden_size).init(device),
            head:       LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_conv_block<B: Backend>(&self, in_ch: usize, out_ch: usize, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv: Conv2dConfig::new([in_ch, out_ch], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            norm:       BatchNormConfig::new(out_ch).init(device),
            activation: Relu::new(),
            pool:       MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

/// conv 3×3 → batch norm → ReLU → 2×2 max pool (halves H and W)
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv:       Conv2d<B>,
    pub norm:       BatchNorm<B, 2>,
    pub activation: Relu,
    pub pool:       MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        self.pool.forward(self.activation.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub blocks:     Vec<ConvBlock<B>>,
    pub pool:       AdaptiveAvgPool2d,
    pub hidden:     Linear<B>,
    pub head:       Linear<B>,
    pub activation: Relu,
    pub dropout:    Dropout,
}

impl<B: Backend> ImageClassifier<B> {
    /// images: [batch, channels, height, width] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        // Global average pool so any input resolution works.
        let x = self.pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(self.activation.forward(self.hidden.forward(x)));
        self.head.forward(x)
    }

    /// Cross-entropy loss over the batch plus the logits it was computed from.
    pub fn forward_loss(&self, images: Tensor<B, 4>, targets: Tensor<B, 1, Int>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let ce = burn::nn::loss::CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), targets);
        (loss, logits)
    }
}

// ─── Optimizer settings ──────────────────────────────────────────────────────
// Read from the `optimizer` sub-node of the model config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerSettings {
    pub lr:           f64,
    pub weight_decay: f64,
    pub beta_1:       f64,
    pub beta_2:       f64,
    pub epsilon:      f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            lr:           1e-3,
            weight_decay: 0.0,
            beta_1:       0.9,
            beta_2:       0.999,
            epsilon:      1e-8,
        }
    }
}

impl OptimizerSettings {
    pub fn adam(&self) -> AdamConfig {
        let config = AdamConfig::new()
            .with_beta_1(self.beta_1 as _)
            .with_beta_2(self.beta_2 as _)
            .with_epsilon(self.epsilon as _);
        if self.weight_decay > 0.0 {
            config.with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay as _)))
        } else {
            config
        }
    }
}

/// What the `model` config node builds: the network plus how to optimise it.
#[derive(Debug, Clone)]
pub struct Classifier<B: Backend> {
    pub network:   ImageClassifier<B>,
    pub optimizer: OptimizerSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn forward_produces_one_logit_row_per_image() {
        let device = Default::default();
        let model = ImageClassifierConfig::new(5, 3, vec![4, 8], 16, 0.0).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        assert_eq!(model.forward(images).dims(), [2, 5]);
    }

    #[test]
    fn no_conv_blocks_still_classifies() {
        let device = Default::default();
        let model = ImageClassifierConfig::new(2, 3, vec![], 8, 0.0).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 5, 7], &device);
        assert_eq!(model.forward(images).dims(), [1, 2]);
    }

    #[test]
    fn optimizer_defaults_match_adam_defaults() {
        let settings: OptimizerSettings = serde_yaml::from_str("lr: 0.01").unwrap();
        assert_eq!(settings.lr, 0.01);
        assert_eq!(settings.weight_decay, 0.0);
        assert!(serde_yaml::from_str::<OptimizerSettings>("momentum: 0.9").is_err());
    }
}
