//! Stage sequencing.
//!
//! A [`Pipeline`] is an ordered list of named stages built once and run
//! repeatedly. Each stage consumes the previous stage's output in full
//! before the next begins. Fusion stages pull in a side-channel context
//! tensor by slot index; the pipeline never resizes contexts.

use crate::activation::Activation;
use crate::conv::Conv2d;
use crate::error::{CodecError, Result};
use crate::fusion::concat_channels;
use crate::quant::{quantize_at, QuantPoint, QuantPolicy};
use crate::resblock::ResidualBlock;
use crate::scalar::Scalar;
use crate::tensor::{Shape4, Tensor4D};
use crate::upsample::Upsampler;

/// Read-only hook invoked after each stage.
pub trait StageObserver<T: Scalar> {
    fn on_stage(&mut self, stage: &str, output: &Tensor4D<T>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl<T: Scalar> StageObserver<T> for NoopObserver {
    fn on_stage(&mut self, _stage: &str, _output: &Tensor4D<T>) {}
}

/// Logs each stage's shape and its leading 2x2 corner of channel 0 at debug
/// level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl<T: Scalar> StageObserver<T> for LogObserver {
    fn on_stage(&mut self, stage: &str, output: &Tensor4D<T>) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        log::debug!("after {}: shape {} corner {:?}", stage, output.shape(), corner(output));
    }
}

/// Leading 2x2 corner of batch 0, channel 0; empty when there is none.
fn corner<T: Scalar>(output: &Tensor4D<T>) -> Vec<T> {
    let s = output.shape();
    if s.n == 0 || s.c == 0 {
        return Vec::new();
    }
    let mut corner = Vec::with_capacity(4);
    for y in 0..s.h.min(2) {
        for x in 0..s.w.min(2) {
            corner.push(output.get(0, 0, y, x));
        }
    }
    corner
}

/// Records (stage, shape) pairs.
#[derive(Debug, Default, Clone)]
pub struct ShapeRecorder {
    pub records: Vec<(String, Shape4)>,
}

impl<T: Scalar> StageObserver<T> for ShapeRecorder {
    fn on_stage(&mut self, stage: &str, output: &Tensor4D<T>) {
        self.records.push((stage.to_string(), output.shape()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage<T> {
    Conv(Conv2d<T>),
    Activation {
        activation: Activation,
        policy: QuantPolicy,
    },
    Residual(ResidualBlock<T>),
    /// Concatenate context slot `context` after the current features.
    Fuse { context: usize },
    Upsample(Upsampler<T>),
}

impl<T: Scalar> PipelineStage<T> {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineStage::Conv(_) => "conv",
            PipelineStage::Activation { .. } => "activation",
            PipelineStage::Residual(_) => "resblock",
            PipelineStage::Fuse { .. } => "fuse",
            PipelineStage::Upsample(_) => "upsample",
        }
    }

    fn apply(&self, x: Tensor4D<T>, contexts: &[&Tensor4D<T>]) -> Result<Tensor4D<T>> {
        match self {
            PipelineStage::Conv(conv) => conv.forward(&x),
            PipelineStage::Activation { activation, policy } => {
                let mut out = x;
                activation.apply_in_place(&mut out);
                quantize_at(&mut out, *policy, QuantPoint::PostActivation);
                Ok(out)
            }
            PipelineStage::Residual(block) => block.forward(&x),
            PipelineStage::Fuse { context } => {
                let ctx = contexts.get(*context).ok_or_else(|| {
                    CodecError::config(format!("context slot {} not supplied", context))
                })?;
                concat_channels(&x, &[*ctx])
            }
            PipelineStage::Upsample(up) => up.forward(&x),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedStage<T> {
    pub name: String,
    pub stage: PipelineStage<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline<T> {
    stages: Vec<NamedStage<T>>,
    context_count: usize,
}

impl<T: Scalar> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> Pipeline<T> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            context_count: 0,
        }
    }

    pub fn push(&mut self, name: impl Into<String>, stage: PipelineStage<T>) -> &mut Self {
        if let PipelineStage::Fuse { context } = &stage {
            self.context_count = self.context_count.max(*context + 1);
        }
        self.stages.push(NamedStage {
            name: name.into(),
            stage,
        });
        self
    }

    pub fn stages(&self) -> &[NamedStage<T>] {
        &self.stages
    }

    /// Number of context tensors `run` expects.
    pub fn context_count(&self) -> usize {
        self.context_count
    }

    pub fn run(
        &self,
        input: &Tensor4D<T>,
        contexts: &[&Tensor4D<T>],
        observer: &mut dyn StageObserver<T>,
    ) -> Result<Tensor4D<T>> {
        if contexts.len() != self.context_count {
            return Err(CodecError::config(format!(
                "pipeline expects {} context tensors, got {}",
                self.context_count,
                contexts.len()
            )));
        }

        let mut x = input.clone();
        for named in &self.stages {
            log::trace!("{} ({}) <- {}", named.name, named.stage.kind(), x.shape());
            x = named.stage.apply(x, contexts)?;
            observer.on_stage(&named.name, &x);
        }
        Ok(x)
    }
}
