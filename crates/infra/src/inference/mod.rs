//! Inference backend implementation
//!
//! [`ModelRegistry`] implements the core's `InferenceBackend` over a
//! role-to-model map. Models are loaded on the control side through a
//! [`ModelLoader`] and published atomically; the audio thread only ever
//! reads the published map.

pub mod kernel;
pub mod registry;

pub use kernel::{KernelLoader, KernelModel};
pub use registry::ModelRegistry;

use async_trait::async_trait;
use cadenza_core::domain::{InferenceError, TensorShape};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or managing models
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model config not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid model file {path}: {reason}")]
    InvalidModel { path: PathBuf, reason: String },

    #[error("No model path known for role '{0}'")]
    UnknownRole(String),

    #[error("No model config has been loaded")]
    NoConfig,
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A loaded model that maps one flat tensor to another
///
/// `run` is called from the audio thread. `output` arrives empty with
/// capacity for at least `shape.len()` values.
pub trait InferenceModel: Send + Sync {
    fn run(
        &self,
        input: &[f32],
        shape: TensorShape,
        output: &mut Vec<f32>,
    ) -> std::result::Result<(), InferenceError>;

    /// Human-readable description for logs
    fn describe(&self) -> String {
        "model".to_string()
    }
}

/// Turns a model file into a runnable model
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Arc<dyn InferenceModel>>;
}
