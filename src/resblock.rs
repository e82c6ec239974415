//! Residual block.
//!
//! `first -> conv1 -> act -> conv2 -> last -> + x`, with the block's policy
//! applied after every one of those steps. `first` and `last` are the
//! activation or identity depending on the config. A bottleneck block halves
//! the channel count in conv1 and restores it in conv2.

use crate::activation::Activation;
use crate::conv::{Conv2d, Conv2dConfig, Kernel};
use crate::error::{CodecError, Result};
use crate::quant::{quantize_at, QuantPoint, QuantPolicy};
use crate::scalar::Scalar;
use crate::tensor::Tensor4D;
use serde::{Deserialize, Serialize};

/// Kernel geometry shared by both convolutions of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResKernel {
    /// 1x1, no padding.
    K1,
    /// 3x3, padding 1.
    #[default]
    K3,
}

impl ResKernel {
    pub fn size(self) -> usize {
        match self {
            ResKernel::K1 => 1,
            ResKernel::K3 => 3,
        }
    }

    pub fn padding(self) -> usize {
        self.size() / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualBlockConfig {
    pub channels: usize,
    pub slope: f32,
    pub start_from_activation: bool,
    pub end_with_activation: bool,
    pub bottleneck: bool,
    pub kernel: ResKernel,
}

impl Default for ResidualBlockConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            slope: 0.01,
            start_from_activation: true,
            end_with_activation: false,
            bottleneck: false,
            kernel: ResKernel::K3,
        }
    }
}

impl ResidualBlockConfig {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn with_slope(mut self, slope: f32) -> Self {
        self.slope = slope;
        self
    }

    pub fn with_activations(mut self, start: bool, end: bool) -> Self {
        self.start_from_activation = start;
        self.end_with_activation = end;
        self
    }

    pub fn with_bottleneck(mut self, bottleneck: bool) -> Self {
        self.bottleneck = bottleneck;
        self
    }

    pub fn with_kernel(mut self, kernel: ResKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(CodecError::config("residual block needs at least one channel"));
        }
        if self.bottleneck && self.channels % 2 != 0 {
            return Err(CodecError::config(format!(
                "bottleneck residual block needs an even channel count, got {}",
                self.channels
            )));
        }
        Ok(())
    }

    /// Channels between conv1 and conv2.
    pub fn inner_channels(&self) -> usize {
        if self.bottleneck {
            self.channels / 2
        } else {
            self.channels
        }
    }

    pub fn conv1_config(&self) -> Conv2dConfig {
        Conv2dConfig::new(self.channels, self.inner_channels(), self.kernel.size())
            .with_padding(self.kernel.padding())
    }

    pub fn conv2_config(&self) -> Conv2dConfig {
        Conv2dConfig::new(self.inner_channels(), self.channels, self.kernel.size())
            .with_padding(self.kernel.padding())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualBlock<T> {
    config: ResidualBlockConfig,
    activation: Activation,
    first: Activation,
    last: Activation,
    conv1: Conv2d<T>,
    conv2: Conv2d<T>,
    policy: QuantPolicy,
}

impl<T: Scalar> ResidualBlock<T> {
    /// Build a block from its two kernels, which must match
    /// `config.conv1_config()` and `config.conv2_config()`.
    pub fn new(
        config: ResidualBlockConfig,
        conv1: Kernel<T>,
        conv2: Kernel<T>,
        policy: QuantPolicy,
    ) -> Result<Self> {
        config.validate()?;
        check_kernel("conv1", &conv1, &config.conv1_config())?;
        check_kernel("conv2", &conv2, &config.conv2_config())?;

        let activation = Activation::from_slope(config.slope);
        let first = if config.start_from_activation {
            activation.clone()
        } else {
            Activation::Identity
        };
        let last = if config.end_with_activation {
            activation.clone()
        } else {
            Activation::Identity
        };

        Ok(Self {
            config,
            activation,
            first,
            last,
            conv1: Conv2d::new(conv1, policy),
            conv2: Conv2d::new(conv2, policy),
            policy,
        })
    }

    /// Both kernels constant-filled.
    pub fn constant(config: ResidualBlockConfig, weight: T, bias: T, policy: QuantPolicy) -> Result<Self> {
        config.validate()?;
        let conv1 = Kernel::constant(config.conv1_config(), weight, bias)?;
        let conv2 = Kernel::constant(config.conv2_config(), weight, bias)?;
        Self::new(config, conv1, conv2, policy)
    }

    pub fn config(&self) -> &ResidualBlockConfig {
        &self.config
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn forward(&self, x: &Tensor4D<T>) -> Result<Tensor4D<T>> {
        let shape = x.shape();
        if shape.c != self.config.channels {
            return Err(CodecError::shape(
                "residual block",
                format!("{} channels", self.config.channels),
                shape,
            ));
        }

        let mut out = self.first.apply(x);
        quantize_at(&mut out, self.policy, QuantPoint::PostActivation);

        let mut out = self.conv1.forward(&out)?;
        self.activation.apply_in_place(&mut out);
        quantize_at(&mut out, self.policy, QuantPoint::PostActivation);

        let mut out = self.conv2.forward(&out)?;
        self.last.apply_in_place(&mut out);
        quantize_at(&mut out, self.policy, QuantPoint::PostActivation);

        if out.shape() != shape {
            return Err(CodecError::shape("residual add", shape, out.shape()));
        }
        let mut sum = x.add(&out)?;
        quantize_at(&mut sum, self.policy, QuantPoint::PostResidualAdd);
        Ok(sum)
    }
}

fn check_kernel<T: Scalar>(name: &str, kernel: &Kernel<T>, expected: &Conv2dConfig) -> Result<()> {
    if kernel.config() != expected {
        return Err(CodecError::config(format!(
            "residual {} kernel {:?} does not match block geometry {:?}",
            name,
            kernel.config(),
            expected
        )));
    }
    Ok(())
}
