//! Contextual encoder: 16x spatial reduction fusing three context tensors.
//!
//! ```text
//! x ++ context1        -> conv1 (3x3, s2)  (N+3) -> N
//!   ++ context2        -> res1  (2N, bottleneck)
//!                      -> conv2 (3x3, s2)  2N -> N
//!   ++ context3        -> res2  (2N, bottleneck)
//!                      -> conv3 (3x3, s2)  2N -> N
//!                      -> conv4 (3x3, s2)  N -> M
//! ```
//!
//! context1 is at the input resolution, context2 at 1/2, context3 at 1/4.
//! Each must carry N channels for the fused widths to line up; x ++ context1
//! together carry N + `input_channels`.

use crate::conv::{Conv2d, Conv2dConfig};
use crate::error::{CodecError, Result};
use crate::pipeline::{NoopObserver, Pipeline, PipelineStage, StageObserver};
use crate::quant::QuantPolicy;
use crate::resblock::{ResKernel, ResidualBlock, ResidualBlockConfig};
use crate::scalar::Scalar;
use crate::tensor::{Shape4, Tensor4D};
use crate::weights::WeightSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub channel_n: usize,
    pub channel_m: usize,
    /// Channels beyond N entering conv1 (x ++ context1 = N + this).
    pub input_channels: usize,
    pub policy: QuantPolicy,
    pub res_slope: f32,
    pub bottleneck: bool,
    pub res_kernel: ResKernel,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            channel_n: 64,
            channel_m: 96,
            input_channels: 3,
            policy: QuantPolicy::None,
            res_slope: 0.1,
            bottleneck: true,
            res_kernel: ResKernel::K3,
        }
    }
}

impl EncoderConfig {
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
        if self.channel_n == 0 || self.channel_m == 0 || self.input_channels == 0 {
            return Err(CodecError::config(format!(
                "encoder channels must be > 0 (N={}, M={}, input={})",
                self.channel_n, self.channel_m, self.input_channels
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

    /// Shape of the encoder output for an (n, _, h, w) input.
    pub fn output_shape(&self, input: Shape4) -> Result<Shape4> {
        let down = Conv2dConfig::new(1, 1, 3).with_stride(2).with_padding(1);
        let (mut h, mut w) = (input.h, input.w);
        for _ in 0..4 {
            (h, w) = down.output_dims(h, w)?;
        }
        Ok(Shape4::new(input.n, self.channel_m, h, w))
    }
}

/// Stride-2 3x3 convolution with padding 1.
fn downsample_conv<T: Scalar>(
    source: &dyn WeightSource<T>,
    name: &str,
    cin: usize,
    cout: usize,
    policy: QuantPolicy,
) -> Result<PipelineStage<T>> {
    let cfg = Conv2dConfig::new(cin, cout, 3).with_stride(2).with_padding(1);
    Ok(PipelineStage::Conv(Conv2d::new(source.kernel(name, &cfg)?, policy)))
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
pub struct ContextualEncoder<T> {
    config: EncoderConfig,
    pipeline: Pipeline<T>,
}

impl<T: Scalar> ContextualEncoder<T> {
    /// Build all stages, pulling kernels from `source`.
    pub fn new(config: EncoderConfig, source: &dyn WeightSource<T>) -> Result<Self> {
        config.validate()?;
        let n = config.channel_n;
        let m = config.channel_m;
        let policy = config.policy;
        let res = config.res_config();

        let mut pipeline = Pipeline::new();
        pipeline
            .push("fuse1", PipelineStage::Fuse { context: 0 })
            .push("conv1", downsample_conv(source, "conv1", n + config.input_channels, n, policy)?)
            .push("fuse2", PipelineStage::Fuse { context: 1 })
            .push("res1", residual(source, "res1", res, policy)?)
            .push("conv2", downsample_conv(source, "conv2", 2 * n, n, policy)?)
            .push("fuse3", PipelineStage::Fuse { context: 2 })
            .push("res2", residual(source, "res2", res, policy)?)
            .push("conv3", downsample_conv(source, "conv3", 2 * n, n, policy)?)
            .push("conv4", downsample_conv(source, "conv4", n, m, policy)?);

        log::debug!(
            "built contextual encoder: N={} M={} policy={:?} domain={}",
            n,
            m,
            policy,
            T::DOMAIN
        );
        Ok(Self { config, pipeline })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline<T> {
        &self.pipeline
    }

    pub fn forward(
        &self,
        x: &Tensor4D<T>,
        context1: &Tensor4D<T>,
        context2: &Tensor4D<T>,
        context3: &Tensor4D<T>,
    ) -> Result<Tensor4D<T>> {
        self.forward_observed(x, context1, context2, context3, &mut NoopObserver)
    }

    pub fn forward_observed(
        &self,
        x: &Tensor4D<T>,
        context1: &Tensor4D<T>,
        context2: &Tensor4D<T>,
        context3: &Tensor4D<T>,
        observer: &mut dyn StageObserver<T>,
    ) -> Result<Tensor4D<T>> {
        self.pipeline.run(x, &[context1, context2, context3], observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ShapeRecorder;
    use crate::weights::{ConstantWeights, NamedWeights};

    #[test]
    fn test_config_default() {
        let config = EncoderConfig::default();
        assert_eq!(config.channel_n, 64);
        assert_eq!(config.channel_m, 96);
        assert_eq!(config.policy, QuantPolicy::None);
    }

    #[test]
    fn test_config_from_json() {
        let config = EncoderConfig::from_json_str(r#"{"channel_n": 1, "channel_m": 1, "policy": "mod256"}"#).unwrap();
        assert_eq!(config.channel_n, 1);
        assert_eq!(config.policy, QuantPolicy::Mod256);
        assert_eq!(config.input_channels, 3);

        let err = EncoderConfig::from_json_str(r#"{"channel_n": 0}"#).unwrap_err();
        assert!(err.is_config());
        assert!(matches!(
            EncoderConfig::from_json_str("{").unwrap_err(),
            CodecError::Json(_)
        ));
    }

    #[test]
    fn test_output_shape() {
        let config = EncoderConfig::new(4, 6);
        let out = config.output_shape(Shape4::new(1, 3, 64, 48)).unwrap();
        assert_eq!(out, Shape4::new(1, 6, 4, 3));
    }

    #[test]
    fn test_stage_shapes() {
        let config = EncoderConfig::new(2, 5);
        let enc = ContextualEncoder::new(config, &ConstantWeights::<f32>::new(0.0, 1.0)).unwrap();

        let x = Tensor4D::zeros(Shape4::new(1, 3, 16, 16));
        let c1 = Tensor4D::zeros(Shape4::new(1, 2, 16, 16));
        let c2 = Tensor4D::zeros(Shape4::new(1, 2, 8, 8));
        let c3 = Tensor4D::zeros(Shape4::new(1, 2, 4, 4));

        let mut rec = ShapeRecorder::default();
        let out = enc.forward_observed(&x, &c1, &c2, &c3, &mut rec).unwrap();
        assert_eq!(out.shape(), Shape4::new(1, 5, 1, 1));
        assert!(out.data().iter().all(|&v| v == 1.0));

        let shapes: Vec<(&str, Shape4)> = rec.records.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        assert_eq!(
            shapes,
            vec![
                ("fuse1", Shape4::new(1, 5, 16, 16)),
                ("conv1", Shape4::new(1, 2, 8, 8)),
                ("fuse2", Shape4::new(1, 4, 8, 8)),
                ("res1", Shape4::new(1, 4, 8, 8)),
                ("conv2", Shape4::new(1, 2, 4, 4)),
                ("fuse3", Shape4::new(1, 4, 4, 4)),
                ("res2", Shape4::new(1, 4, 4, 4)),
                ("conv3", Shape4::new(1, 2, 2, 2)),
                ("conv4", Shape4::new(1, 5, 1, 1)),
            ]
        );
    }

    #[test]
    fn test_missing_named_weights_fail_at_construction() {
        let source = NamedWeights::<i32>::new();
        let err = ContextualEncoder::new(EncoderConfig::new(1, 1), &source).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_context_at_wrong_resolution_is_shape_error() {
        let enc = ContextualEncoder::new(EncoderConfig::new(1, 1), &ConstantWeights::<i32>::unit()).unwrap();
        let x = Tensor4D::zeros(Shape4::new(1, 1, 16, 16));
        let c1 = Tensor4D::zeros(Shape4::new(1, 3, 16, 16));
        let c2 = Tensor4D::zeros(Shape4::new(1, 1, 16, 16));
        let c3 = Tensor4D::zeros(Shape4::new(1, 1, 4, 4));
        assert!(enc.forward(&x, &c1, &c2, &c3).unwrap_err().is_shape());
    }
}
