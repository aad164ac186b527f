//! FIR kernel model format
//!
//! A kernel model is a JSON document:
//!
//! ```json
//! { "kernel": [0.5, 0.25, 0.125], "gain": 1.0 }
//! ```
//!
//! Each channel of the input tensor is convolved with `kernel` and scaled
//! by `gain`. The convolution is block-local (no history carried between
//! calls), and the output has the same length as the input.

use super::{InferenceModel, ModelLoader, RegistryError, Result};
use async_trait::async_trait;
use cadenza_core::domain::{InferenceError, TensorShape};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Longest accepted kernel, in taps
pub const MAX_KERNEL_TAPS: usize = 4096;

fn default_gain() -> f32 {
    1.0
}

/// Per-channel FIR filter loaded from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelModel {
    pub kernel: Vec<f32>,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl KernelModel {
    pub fn new(kernel: Vec<f32>, gain: f32) -> Self {
        Self { kernel, gain }
    }

    /// Single-tap kernel that only applies `gain`
    pub fn identity(gain: f32) -> Self {
        Self::new(vec![1.0], gain)
    }

    /// Parse and validate a kernel document
    pub fn from_json(json: &str, path: &Path) -> Result<Self> {
        let model: KernelModel = serde_json::from_str(json)?;
        model.validate().map_err(|reason| RegistryError::InvalidModel {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(model)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.kernel.is_empty() {
            return Err("kernel is empty".to_string());
        }
        if self.kernel.len() > MAX_KERNEL_TAPS {
            return Err(format!(
                "kernel has {} taps (max {})",
                self.kernel.len(),
                MAX_KERNEL_TAPS
            ));
        }
        if !self.gain.is_finite() || self.kernel.iter().any(|k| !k.is_finite()) {
            return Err("kernel values must be finite".to_string());
        }
        Ok(())
    }

    /// Load a kernel model from a JSON file
    #[instrument]
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let model = Self::from_json(&contents, path)?;
        debug!("Loaded kernel model with {} taps", model.kernel.len());
        Ok(model)
    }
}

impl InferenceModel for KernelModel {
    fn run(
        &self,
        input: &[f32],
        shape: TensorShape,
        output: &mut Vec<f32>,
    ) -> std::result::Result<(), InferenceError> {
        if input.len() != shape.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: shape.len(),
                actual: input.len(),
            });
        }

        let samples = shape.samples;
        output.clear();
        if samples == 0 {
            return Ok(());
        }

        for channel in input.chunks_exact(samples) {
            for n in 0..samples {
                let taps = self.kernel.len().min(n + 1);
                let acc: f32 = self.kernel[..taps]
                    .iter()
                    .enumerate()
                    .map(|(k, &h)| h * channel[n - k])
                    .sum();
                output.push(acc * self.gain);
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("kernel ({} taps, gain {})", self.kernel.len(), self.gain)
    }
}

/// [`ModelLoader`] for kernel JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelLoader;

#[async_trait]
impl ModelLoader for KernelLoader {
    async fn load(&self, path: &Path) -> Result<Arc<dyn InferenceModel>> {
        let model = KernelModel::load(path).await?;
        Ok(Arc::new(model))
    }
}
