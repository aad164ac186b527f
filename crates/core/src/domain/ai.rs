//! Bridge between effect chains and an external inference backend
//!
//! The backend is any type implementing [`InferenceBackend`]; this crate
//! only defines the seam. [`AiEffect`] marshals a planar block into a flat
//! channel-major tensor, runs inference for one model role and copies the
//! result back. A backend that is not ready, or that fails, leaves the
//! block untouched.

use crate::domain::audio::{AudioBuffer, ProcessSpec};
use crate::domain::dsp::{prepared_spec, Effect, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors reported by an inference backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Model for role '{0}' is not ready")]
    NotReady(String),

    #[error("No model registered for role '{0}'")]
    ModelNotFound(String),

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Shape descriptor passed alongside the flat tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape {
    pub batch: usize,
    pub channels: usize,
    pub samples: usize,
}

impl TensorShape {
    /// Shape of one planar block: `{1, channels, samples}`
    pub fn for_block(channels: usize, samples: usize) -> Self {
        Self {
            batch: 1,
            channels,
            samples,
        }
    }

    /// Number of values in a tensor of this shape
    pub fn len(&self) -> usize {
        self.batch * self.channels * self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// External neural-inference provider, keyed by model role
///
/// Implementations must be callable from the audio thread: `output` arrives
/// empty with enough capacity for `shape.len()` values, and filling it
/// within that capacity must not allocate.
pub trait InferenceBackend: Send + Sync {
    /// Whether a model for `role` is loaded and usable
    fn is_ready(&self, role: &str) -> bool;

    /// Run the model for `role` over `input`
    fn run_inference(
        &self,
        role: &str,
        input: &[f32],
        shape: TensorShape,
        output: &mut Vec<f32>,
    ) -> std::result::Result<(), InferenceError>;
}

/// Backend with no models, every role reports not ready
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackend;

impl InferenceBackend for NoBackend {
    fn is_ready(&self, _role: &str) -> bool {
        false
    }

    fn run_inference(
        &self,
        role: &str,
        _input: &[f32],
        _shape: TensorShape,
        _output: &mut Vec<f32>,
    ) -> std::result::Result<(), InferenceError> {
        Err(InferenceError::NotReady(role.to_string()))
    }
}

/// Effect that runs one inference role over each block
pub struct AiEffect {
    role: String,
    name: String,
    backend: Arc<dyn InferenceBackend>,
    spec: Option<ProcessSpec>,
    input: Vec<f32>,
    output: Vec<f32>,
    failures: u64,
}

impl std::fmt::Debug for AiEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiEffect")
            .field("role", &self.role)
            .field("failures", &self.failures)
            .finish()
    }
}

impl AiEffect {
    pub fn new(role: impl Into<String>, backend: Arc<dyn InferenceBackend>) -> Self {
        let role = role.into();
        Self {
            name: format!("AI: {}", role),
            role,
            backend,
            spec: None,
            input: Vec::new(),
            output: Vec::new(),
            failures: 0,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Whether the backend currently has a model for this role
    pub fn is_ready(&self) -> bool {
        self.backend.is_ready(&self.role)
    }

    /// Inference calls that failed and fell back to pass-through
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn flatten(&mut self, buffer: &AudioBuffer) {
        self.input.clear();
        for channel in buffer.channels() {
            self.input.extend_from_slice(channel);
        }
    }

    fn write_back(&self, buffer: &mut AudioBuffer) {
        let samples = buffer.num_samples();
        for (ch, channel) in buffer.channels_mut().enumerate() {
            let start = ch * samples;
            if start >= self.output.len() {
                break;
            }
            let end = (start + samples).min(self.output.len());
            channel[..end - start].copy_from_slice(&self.output[start..end]);
        }
    }
}

impl Effect for AiEffect {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        let values = spec.max_block_size * spec.channels;
        self.input.reserve(values.saturating_sub(self.input.len()));
        self.output.reserve(values.saturating_sub(self.output.len()));
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        if buffer.is_empty() || !self.backend.is_ready(&self.role) {
            return Ok(());
        }

        self.flatten(buffer);
        let shape = TensorShape::for_block(buffer.num_channels(), buffer.num_samples());
        self.output.clear();

        match self
            .backend
            .run_inference(&self.role, &self.input, shape, &mut self.output)
        {
            Ok(()) => {
                if self.output.len() != shape.len() {
                    trace!(
                        "Inference for '{}' returned {} values, expected {}",
                        self.role,
                        self.output.len(),
                        shape.len()
                    );
                }
                self.write_back(buffer);
            }
            Err(e) => {
                self.failures += 1;
                debug!("Inference for '{}' failed, passing through: {}", self.role, e);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
