//! Kernel construction for the fixed topologies.
//!
//! Pipelines ask a [`WeightSource`] for each convolution by stage name
//! (`"conv1"`, `"res1.conv2"`, `"up3"`, ...) and declared geometry. There is
//! no global model state: whatever the source returns is owned by the stage.

use crate::conv::{Conv2dConfig, Kernel};
use crate::error::{CodecError, Result};
use crate::scalar::Scalar;
use crate::tensor::Tensor4D;
use std::collections::HashMap;

pub trait WeightSource<T: Scalar> {
    fn kernel(&self, name: &str, config: &Conv2dConfig) -> Result<Kernel<T>>;
}

/// Every weight and every bias set to a constant. The hardware testbenches
/// use weight 1, bias 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantWeights<T> {
    pub weight: T,
    pub bias: T,
}

impl<T: Scalar> ConstantWeights<T> {
    pub fn new(weight: T, bias: T) -> Self {
        Self { weight, bias }
    }

    /// Weight 1, bias 0.
    pub fn unit() -> Self {
        Self::new(T::one(), T::default())
    }
}

impl<T: Scalar> WeightSource<T> for ConstantWeights<T> {
    fn kernel(&self, _name: &str, config: &Conv2dConfig) -> Result<Kernel<T>> {
        Kernel::constant(*config, self.weight, self.bias)
    }
}

/// Externally supplied weight and bias tensors keyed by stage name.
#[derive(Debug, Clone, Default)]
pub struct NamedWeights<T> {
    entries: HashMap<String, (Tensor4D<T>, Option<Vec<T>>)>,
}

impl<T: Scalar> NamedWeights<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, weight: Tensor4D<T>, bias: Option<Vec<T>>) -> &mut Self {
        self.entries.insert(name.into(), (weight, bias));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl<T: Scalar> WeightSource<T> for NamedWeights<T> {
    fn kernel(&self, name: &str, config: &Conv2dConfig) -> Result<Kernel<T>> {
        let (weight, bias) = self
            .entries
            .get(name)
            .ok_or_else(|| CodecError::config(format!("no weights supplied for {}", name)))?;
        Kernel::new(*config, weight.clone(), bias.clone())
    }
}
