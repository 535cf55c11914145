//! Shared parameter storage for Hogwild-style asynchronous updates.
//!
//! A `ParamSet` holds named tensors, each behind its own lock. Gradient
//! application never takes a global lock: concurrent callers interleave at
//! tensor granularity, last-write-wins per tensor, and no individual tensor
//! is ever observed half-written.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Error type for parameter operations.
#[derive(Debug)]
pub enum ParamError {
    /// Tensor name absent from a snapshot or gradient set.
    NameMismatch(String),
    /// Tensor present but with the wrong element count.
    LengthMismatch {
        /// Tensor name.
        name: String,
        /// Elements in the destination tensor.
        expected: usize,
        /// Elements supplied.
        got: usize,
    },
    /// IO error during save/load.
    Io(io::Error),
    /// Serialization error.
    Serde(String),
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamError::NameMismatch(name) => write!(f, "unknown tensor: {}", name),
            ParamError::LengthMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "tensor {} has {} elements, expected {}",
                name, got, expected
            ),
            ParamError::Io(e) => write!(f, "IO error: {}", e),
            ParamError::Serde(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for ParamError {}

impl From<io::Error> for ParamError {
    fn from(e: io::Error) -> Self {
        ParamError::Io(e)
    }
}

/// One named tensor guarded by its own lock.
struct ParamTensor {
    name: String,
    data: Mutex<Vec<f32>>,
}

/// An ordered collection of named tensors. Registration order is the layer
/// order, shallowest first; transfer exclusion cuts from the deep end.
pub struct ParamSet {
    tensors: Vec<ParamTensor>,
}

impl ParamSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self {
            tensors: Vec::new(),
        }
    }

    /// Register a tensor. Builder-style, used at model construction.
    pub fn tensor(mut self, name: impl Into<String>, init: Vec<f32>) -> Self {
        self.tensors.push(ParamTensor {
            name: name.into(),
            data: Mutex::new(init),
        });
        self
    }

    /// Tensor names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tensors.iter().map(|t| t.name.clone()).collect()
    }

    /// Clone the contents of one tensor.
    pub fn read(&self, name: &str) -> Option<Vec<f32>> {
        self.tensors
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.data.lock().clone())
    }

    /// Apply a scaled gradient set: `param += scale * grad` per tensor.
    ///
    /// Safe to call concurrently from multiple threads without external
    /// locking; each tensor is updated atomically, last-write-wins across
    /// tensors.
    pub fn scaled_add(&self, grads: &GradientSet, scale: f32) {
        for (name, grad) in &grads.tensors {
            if let Some(tensor) = self.tensors.iter().find(|t| t.name == *name) {
                let mut data = tensor.data.lock();
                for (p, g) in data.iter_mut().zip(grad.iter()) {
                    *p += scale * g;
                }
            }
        }
    }

    /// Copy all tensors from another set, one tensor at a time (read then
    /// write, never holding two locks at once).
    pub fn copy_from(&self, other: &ParamSet) {
        for tensor in &self.tensors {
            if let Some(src) = other.read(&tensor.name) {
                *tensor.data.lock() = src;
            }
        }
    }

    /// Take a point-in-time copy of every tensor.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            tensors: self
                .tensors
                .iter()
                .map(|t| (t.name.clone(), t.data.lock().clone()))
                .collect(),
        }
    }

    /// Restore every tensor from a snapshot. Fails if any tensor is missing
    /// or has a different element count; nothing is written on failure.
    pub fn restore(&self, snapshot: &ParamSnapshot) -> Result<(), ParamError> {
        for tensor in &self.tensors {
            let src = snapshot
                .get(&tensor.name)
                .ok_or_else(|| ParamError::NameMismatch(tensor.name.clone()))?;
            let expected = tensor.data.lock().len();
            if src.len() != expected {
                return Err(ParamError::LengthMismatch {
                    name: tensor.name.clone(),
                    expected,
                    got: src.len(),
                });
            }
        }
        for tensor in &self.tensors {
            if let Some(src) = snapshot.get(&tensor.name) {
                *tensor.data.lock() = src.to_vec();
            }
        }
        Ok(())
    }

    /// Copy only the named subset from a snapshot, bit-for-bit. Tensors
    /// outside the subset keep their current (fresh) values. Happens once,
    /// before any learner thread starts.
    pub fn transfer_from(
        &self,
        snapshot: &ParamSnapshot,
        subset: &[String],
    ) -> Result<(), ParamError> {
        for name in subset {
            let tensor = self
                .tensors
                .iter()
                .find(|t| t.name == *name)
                .ok_or_else(|| ParamError::NameMismatch(name.clone()))?;
            let src = snapshot
                .get(name)
                .ok_or_else(|| ParamError::NameMismatch(name.clone()))?;
            let expected = tensor.data.lock().len();
            if src.len() != expected {
                return Err(ParamError::LengthMismatch {
                    name: name.clone(),
                    expected,
                    got: src.len(),
                });
            }
            *tensor.data.lock() = src.to_vec();
        }
        Ok(())
    }
}

impl Default for ParamSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable point-in-time copy of a parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    /// (name, data) pairs in registration order.
    pub tensors: Vec<(String, Vec<f32>)>,
}

impl ParamSnapshot {
    /// Look up one tensor by name.
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.tensors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    /// Write the snapshot as JSON.
    pub fn save(&self, path: &Path) -> Result<(), ParamError> {
        let blob = serde_json::to_string(self).map_err(|e| ParamError::Serde(e.to_string()))?;
        fs::write(path, blob)?;
        Ok(())
    }

    /// Read a snapshot from JSON.
    pub fn load(path: &Path) -> Result<Self, ParamError> {
        let blob = fs::read_to_string(path)?;
        serde_json::from_str(&blob).map_err(|e| ParamError::Serde(e.to_string()))
    }
}

/// Gradients for a parameter set, same named-tensor shape.
#[derive(Debug, Clone)]
pub struct GradientSet {
    /// (name, gradient) pairs.
    pub tensors: Vec<(String, Vec<f32>)>,
}

impl GradientSet {
    /// Create a gradient set with zeroed tensors matching the given shapes.
    pub fn zeros_like(shapes: &[(String, usize)]) -> Self {
        Self {
            tensors: shapes
                .iter()
                .map(|(name, len)| (name.clone(), vec![0.0; *len]))
                .collect(),
        }
    }

    /// Mutable access to one tensor's gradient.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<f32>> {
        self.tensors
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    /// Global L2 norm across all tensors.
    pub fn global_norm(&self) -> f32 {
        self.tensors
            .iter()
            .flat_map(|(_, d)| d.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }

    /// Scale every gradient so the global norm does not exceed `max_norm`.
    pub fn clip_global_norm(&mut self, max_norm: f32) {
        let norm = self.global_norm();
        if norm > max_norm && norm > 0.0 {
            let scale = max_norm / norm;
            for (_, d) in &mut self.tensors {
                for g in d.iter_mut() {
                    *g *= scale;
                }
            }
        }
    }
}
