//! Named parameter tensors.
//!
//! Optimizers see the parameters as one flat vector; checkpoints see them as
//! a mapping from name to tensor. The flat order is the sorted tensor-name
//! order, each tensor stored row-major.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamStore {
    tensors: BTreeMap<String, Tensor>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor, checking that `data` matches `shape`.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<()> {
        let expected: usize = tensor.shape.iter().product();
        if expected != tensor.data.len() {
            return Err(ControlError::DimensionMismatch {
                what: "tensor data",
                expected,
                got: tensor.data.len(),
            });
        }
        self.tensors.insert(name.into(), tensor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.tensors.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    /// Total number of scalar parameters.
    pub fn len(&self) -> usize {
        self.tensors.values().map(Tensor::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of a tensor inside the flat vector.
    pub fn range(&self, name: &str) -> Option<Range<usize>> {
        let mut offset = 0;
        for (key, tensor) in &self.tensors {
            if key == name {
                return Some(offset..offset + tensor.len());
            }
            offset += tensor.len();
        }
        None
    }

    /// All parameters as one vector, in sorted-name order.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.len());
        for tensor in self.tensors.values() {
            flat.extend_from_slice(&tensor.data);
        }
        flat
    }

    /// Overwrite all parameters from a flat vector produced by [`Self::to_flat`].
    pub fn set_flat(&mut self, flat: &[f64]) -> Result<()> {
        if flat.len() != self.len() {
            return Err(ControlError::DimensionMismatch {
                what: "flat parameter vector",
                expected: self.len(),
                got: flat.len(),
            });
        }
        let mut offset = 0;
        for tensor in self.tensors.values_mut() {
            let n = tensor.len();
            tensor.data.copy_from_slice(&flat[offset..offset + n]);
            offset += n;
        }
        Ok(())
    }

    /// Same names and shapes as `other`.
    pub fn same_layout(&self, other: &ParamStore) -> bool {
        self.tensors.len() == other.tensors.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|((ka, ta), (kb, tb))| ka == kb && ta.shape == tb.shape)
    }

    /// Check every tensor's data against its shape (deserialized stores skip
    /// the check in [`Self::insert`]).
    pub fn validate(&self) -> Result<()> {
        for (name, tensor) in &self.tensors {
            let expected: usize = tensor.shape.iter().product();
            if expected != tensor.data.len() {
                return Err(ControlError::ArchitectureMismatch(format!(
                    "tensor '{name}' has {} values for shape {:?}",
                    tensor.data.len(),
                    tensor.shape
                )));
            }
        }
        Ok(())
    }

    /// Check whether every parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.tensors
            .values()
            .all(|t| t.data.iter().all(|x| x.is_finite()))
    }
}
