//! Contextual decoder: 16x spatial expansion fusing two context tensors.
//!
//! ```text
//! x                    -> up1 (subpel r=2) M -> N
//!                      -> up2 (subpel r=2) N -> N
//!   ++ context3        -> res1 (2N, bottleneck)
//!                      -> up3 (subpel r=2) 2N -> N
//!   ++ context2        -> res2 (2N, bottleneck)
//!                      -> up4 (subpel r=2) 2N -> out
//! ```
//!
//! For an H x W input, context3 is N x 4H x 4W and context2 is N x 8H x 8W.

use crate::error::{CodecError, Result};
use crate::pipeline::{NoopObserver, Pipeline, PipelineStage, StageObserver};
use crate::quant::QuantPolicy;
use crate::resblock::{ResKernel, ResidualBlock, ResidualBlockConfig};
use crate::scalar::Scalar;
use crate::tensor::{Shape4, Tensor4D};
use crate::upsample::Upsampler;
use crate::weights::WeightSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Spatial factor of every decoder upsampler.
pub const DECODER_UPSAMPLE_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub channel_n: usize,
    pub channel_m: usize,
    pub output_channels: usize,
    pub policy: QuantPolicy,
    pub res_slope: f32,
    pub bottleneck: bool,
    pub res_kernel: ResKernel,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            channel_n: 64,
            channel_m: 96,
            output_channels: 1,
            policy: QuantPolicy::None,
            res_slope: 0.1,
            bottleneck: true,
            res_kernel: ResKernel::K3,
        }
    }
}

impl DecoderConfig {
    pub fn new(channel_n: usize, channel_m: usize) -> Self {
        Self {
            channel_n,
            channel_m,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: QuantPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_n == 0 || self.channel_m == 0 || self.output_channels == 0 {
            return Err(CodecError::config(format!(
                "decoder channels must be > 0 (N={}, M={}, out={})",
                self.channel_n, self.channel_m, self.output_channels
            )));
        }
        Ok(())
    }

    fn res_config(&self) -> ResidualBlockConfig {
        ResidualBlockConfig::new(self.channel_n * 2)
            .with_slope(self.res_slope)
            .with_activations(true, true)
            .with_bottleneck(self.bottleneck)
            .with_kernel(self.res_kernel)
    }

    pub fn output_shape(&self, input: Shape4) -> Shape4 {
        Shape4::new(input.n, self.output_channels, input.h * 16, input.w * 16)
    }
}

fn upsampler<T: Scalar>(
    source: &dyn WeightSource<T>,
    name: &str,
    cin: usize,
    cout: usize,
    policy: QuantPolicy,
) -> Result<PipelineStage<T>> {
    let r = DECODER_UPSAMPLE_FACTOR;
    let cfg = Upsampler::<T>::subpel_conv3x3_config(cin, cout, r);
    Ok(PipelineStage::Upsample(Upsampler::new(source.kernel(name, &cfg)?, r, policy)?))
}

fn residual<T: Scalar>(
    source: &dyn WeightSource<T>,
    name: &str,
    config: ResidualBlockConfig,
    policy: QuantPolicy,
) -> Result<PipelineStage<T>> {
    let conv1 = source.kernel(&format!("{}.conv1", name), &config.conv1_config())?;
    let conv2 = source.kernel(&format!("{}.conv2", name), &config.conv2_config())?;
    Ok(PipelineStage::Residual(ResidualBlock::new(config, conv1, conv2, policy)?))
}

#[derive(Debug)]
pub struct ContextualDecoder<T> {
    config: DecoderConfig,
    pipeline: Pipeline<T>,
}

impl<T: Scalar> ContextualDecoder<T> {
    pub fn new(config: DecoderConfig, source: &dyn WeightSource<T>) -> Result<Self> {
        config.validate()?;
        let n = config.channel_n;
        let policy = config.policy;
        let res = config.res_config();

        // context slots: 0 = context2, 1 = context3
        let mut pipeline = Pipeline::new();
        pipeline
            .push("up1", upsampler(source, "up1", config.channel_m, n, policy)?)
            .push("up2", upsampler(source, "up2", n, n, policy)?)
            .push("fuse3", PipelineStage::Fuse { context: 1 })
            .push("res1", residual(source, "res1", res, policy)?)
            .push("up3", upsampler(source, "up3", 2 * n, n, policy)?)
            .push("fuse2", PipelineStage::Fuse { context: 0 })
            .push("res2", residual(source, "res2", res, policy)?)
            .push("up4", upsampler(source, "up4", 2 * n, config.output_channels, policy)?);

        log::debug!(
            "built contextual decoder: N={} M={} policy={:?} domain={}",
            n,
            config.channel_m,
            policy,
            T::DOMAIN
        );
        Ok(Self { config, pipeline })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline<T> {
        &self.pipeline
    }

    pub fn forward(&self, x: &Tensor4D<T>, context2: &Tensor4D<T>, context3: &Tensor4D<T>) -> Result<Tensor4D<T>> {
        self.forward_observed(x, context2, context3, &mut NoopObserver)
    }

    pub fn forward_observed(
        &self,
        x: &Tensor4D<T>,
        context2: &Tensor4D<T>,
        context3: &Tensor4D<T>,
        observer: &mut dyn StageObserver<T>,
    ) -> Result<Tensor4D<T>> {
        self.pipeline.run(x, &[context2, context3], observer)
    }
}
