//! A small fully convolutional network for the demo.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};
use oncoseg_burn::SegmentationModel;

/// Configuration for [`TinySegNet`].
#[derive(Config, Debug)]
pub struct TinySegNetConfig {
    pub num_classes: usize,
    #[config(default = 1)]
    pub in_channels: usize,
    #[config(default = 16)]
    pub hidden_channels: usize,
}

impl TinySegNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TinySegNet<B> {
        TinySegNet {
            conv1: Conv2dConfig::new([self.in_channels, self.hidden_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.hidden_channels, self.hidden_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            head: Conv2dConfig::new([self.hidden_channels, self.num_classes], [1, 1]).init(device),
            relu: Relu::new(),
        }
    }
}

/// Two 3x3 convolutions and a 1x1 classifier head.
#[derive(Module, Debug)]
pub struct TinySegNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    head: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> SegmentationModel<B> for TinySegNet<B> {
    fn forward(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv1.forward(inputs));
        let x = self.relu.forward(self.conv2.forward(x));
        self.head.forward(x)
    }
}
