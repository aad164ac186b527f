//! Role-keyed model registry
//!
//! The published map lives behind an `ArcSwap`: the audio thread takes a
//! lock-free snapshot per call, while the control side builds a new map
//! and swaps it in. Model paths are remembered so a role, or the whole
//! config, can be reloaded after the files change on disk.

use super::{InferenceModel, KernelLoader, ModelLoader, RegistryError, Result};
use arc_swap::ArcSwap;
use cadenza_core::domain::{InferenceBackend, InferenceError, TensorShape};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

type ModelMap = HashMap<String, Arc<dyn InferenceModel>>;

/// Control-side bookkeeping, never touched by the audio thread
#[derive(Debug, Default)]
struct LoadState {
    paths: HashMap<String, PathBuf>,
    config_path: Option<PathBuf>,
}

/// Inference backend that dispatches each role to a loaded model
pub struct ModelRegistry {
    models: ArcSwap<ModelMap>,
    loader: Arc<dyn ModelLoader>,
    state: Mutex<LoadState>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("roles", &self.loaded_roles())
            .finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(Arc::new(KernelLoader))
    }
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            models: ArcSwap::from_pointee(HashMap::new()),
            loader,
            state: Mutex::new(LoadState::default()),
        }
    }

    /// Copy, edit and swap in the model map; `update` may run more than once
    fn publish(&self, update: impl Fn(&mut ModelMap)) {
        self.models.rcu(|current| {
            let mut next = ModelMap::clone(current);
            update(&mut next);
            next
        });
    }

    /// Install an already-built model for `role`
    pub fn register(&self, role: impl Into<String>, model: Arc<dyn InferenceModel>) {
        let role = role.into();
        debug!("Registering {} for role '{}'", model.describe(), role);
        self.publish(|map| {
            map.insert(role.clone(), Arc::clone(&model));
        });
    }

    /// Remove the model for `role`; returns whether one was loaded
    pub fn unload(&self, role: &str) -> bool {
        let loaded = self.models.load().contains_key(role);
        if loaded {
            self.publish(|map| {
                map.remove(role);
            });
            info!("Unloaded model for role '{}'", role);
        }
        loaded
    }

    pub fn unload_all(&self) {
        self.models.store(Arc::new(HashMap::new()));
        info!("Unloaded all models");
    }

    /// Roles with a loaded model, sorted
    pub fn loaded_roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.models.load().keys().cloned().collect();
        roles.sort();
        roles
    }

    /// Load the model file at `path` for `role`
    #[instrument(skip(self))]
    pub async fn load_model(&self, role: &str, path: &Path) -> Result<()> {
        let model = self.loader.load(path).await?;
        self.state
            .lock()
            .await
            .paths
            .insert(role.to_string(), path.to_path_buf());
        self.register(role, model);
        info!("Loaded model for role '{}' from {}", role, path.display());
        Ok(())
    }

    /// Load every model listed in a JSON `{ role: path }` map
    ///
    /// Relative paths resolve against the config file's directory. Models
    /// that fail to load are skipped with a warning; the number loaded is
    /// returned.
    #[instrument(skip(self))]
    pub async fn load_models_from_config(&self, config_path: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(config_path).await? {
            return Err(RegistryError::ConfigNotFound(config_path.to_path_buf()));
        }
        let contents = tokio::fs::read_to_string(config_path).await?;
        let entries: BTreeMap<String, PathBuf> = serde_json::from_str(&contents)?;
        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

        let mut loaded = 0;
        for (role, path) in entries {
            let model_path = base_dir.join(&path);
            match self.load_model(&role, &model_path).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping model for role '{}': {}", role, e),
            }
        }

        self.state.lock().await.config_path = Some(config_path.to_path_buf());
        info!("Loaded {} models from {}", loaded, config_path.display());
        Ok(loaded)
    }

    /// Reload one role from the path it was last loaded from
    pub async fn reload_model(&self, role: &str) -> Result<()> {
        let path = self
            .state
            .lock()
            .await
            .paths
            .get(role)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRole(role.to_string()))?;
        self.load_model(role, &path).await
    }

    /// Re-read the last loaded model config
    pub async fn reload(&self) -> Result<usize> {
        let config_path = self
            .state
            .lock()
            .await
            .config_path
            .clone()
            .ok_or(RegistryError::NoConfig)?;
        self.load_models_from_config(&config_path).await
    }

    /// Re-read the model config on every change event until the sender closes
    ///
    /// Pair with a `ConfigWatcher` on the model directory. Failed reloads
    /// keep the models already loaded.
    pub async fn reload_on_change(self: Arc<Self>, mut changes: broadcast::Receiver<PathBuf>) {
        loop {
            match changes.recv().await {
                Ok(path) => debug!("Model file changed: {}", path.display()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Coalesced {} model change events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            match self.reload().await {
                Ok(count) => info!("Reloaded {} models", count),
                Err(e) => warn!("Model reload failed: {}", e),
            }
        }
    }
}

impl InferenceBackend for ModelRegistry {
    fn is_ready(&self, role: &str) -> bool {
        self.models.load().contains_key(role)
    }

    fn run_inference(
        &self,
        role: &str,
        input: &[f32],
        shape: TensorShape,
        output: &mut Vec<f32>,
    ) -> std::result::Result<(), InferenceError> {
        let models = self.models.load();
        let model = models
            .get(role)
            .ok_or_else(|| InferenceError::ModelNotFound(role.to_string()))?;
        if input.len() != shape.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: shape.len(),
                actual: input.len(),
            });
        }
        model.run(input, shape, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::KernelModel;
    use tempfile::TempDir;

    async fn write_kernel(dir: &Path, name: &str, gain: f32) -> PathBuf {
        let path = dir.join(name);
        let json = serde_json::to_string(&KernelModel::identity(gain)).unwrap();
        tokio::fs::write(&path, json).await.unwrap();
        path
    }

    fn run(registry: &ModelRegistry, role: &str, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(input.len());
        registry
            .run_inference(
                role,
                input,
                TensorShape::for_block(1, input.len()),
                &mut output,
            )
            .unwrap();
        output
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_registry_not_ready() {
        let registry = ModelRegistry::default();
        assert!(!registry.is_ready("vocal-clarity"));
        let mut output = Vec::new();
        let err = registry
            .run_inference("vocal-clarity", &[0.0], TensorShape::for_block(1, 1), &mut output)
            .unwrap_err();
        assert_eq!(err, InferenceError::ModelNotFound("vocal-clarity".to_string()));
    }

    #[test]
    fn test_register_and_unload() {
        let registry = ModelRegistry::default();
        registry.register("b", Arc::new(KernelModel::identity(1.0)));
        registry.register("a", Arc::new(KernelModel::identity(2.0)));
        assert_eq!(registry.loaded_roles(), vec!["a", "b"]);
        assert_eq!(run(&registry, "a", &[0.5]), vec![1.0]);

        assert!(registry.unload("a"));
        assert!(!registry.unload("a"));
        assert!(!registry.is_ready("a"));
        assert!(registry.is_ready("b"));

        registry.unload_all();
        assert!(registry.loaded_roles().is_empty());
    }

    #[test]
    fn test_shape_checked_before_model() {
        let registry = ModelRegistry::default();
        registry.register("a", Arc::new(KernelModel::identity(1.0)));
        let mut output = Vec::new();
        let err = registry
            .run_inference("a", &[0.0; 3], TensorShape::for_block(2, 2), &mut output)
            .unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }

    // ------------------------------------------------------------------------
    // Loading from disk
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_load_models_from_config() {
        let dir = TempDir::new().unwrap();
        write_kernel(dir.path(), "clarity.json", 0.5).await;
        let config = dir.path().join("models.json");
        tokio::fs::write(
            &config,
            r#"{"vocal-clarity": "clarity.json", "broken": "missing.json"}"#,
        )
        .await
        .unwrap();

        let registry = ModelRegistry::default();
        let loaded = registry.load_models_from_config(&config).await.unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(registry.loaded_roles(), vec!["vocal-clarity"]);
        assert_eq!(run(&registry, "vocal-clarity", &[1.0, -1.0]), vec![0.5, -0.5]);
    }

    #[tokio::test]
    async fn test_missing_config() {
        let dir = TempDir::new().unwrap();
        let registry = ModelRegistry::default();
        let err = registry
            .load_models_from_config(&dir.path().join("models.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConfigNotFound(_)));
        assert!(matches!(registry.reload().await, Err(RegistryError::NoConfig)));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let model_path = write_kernel(dir.path(), "clarity.json", 0.5).await;
        let config = dir.path().join("models.json");
        tokio::fs::write(&config, r#"{"vocal-clarity": "clarity.json"}"#)
            .await
            .unwrap();

        let registry = ModelRegistry::default();
        registry.load_models_from_config(&config).await.unwrap();

        write_kernel(dir.path(), "clarity.json", 2.0).await;
        registry.reload_model("vocal-clarity").await.unwrap();
        assert_eq!(run(&registry, "vocal-clarity", &[1.0]), vec![2.0]);

        tokio::fs::write(&model_path, r#"{"kernel": [1.0], "gain": 3.0}"#)
            .await
            .unwrap();
        assert_eq!(registry.reload().await.unwrap(), 1);
        assert_eq!(run(&registry, "vocal-clarity", &[1.0]), vec![3.0]);

        assert!(matches!(
            registry.reload_model("unknown").await,
            Err(RegistryError::UnknownRole(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_on_change_event() {
        let dir = TempDir::new().unwrap();
        let model_path = write_kernel(dir.path(), "clarity.json", 0.5).await;
        let config = dir.path().join("models.json");
        tokio::fs::write(&config, r#"{"vocal-clarity": "clarity.json"}"#)
            .await
            .unwrap();

        let registry = Arc::new(ModelRegistry::default());
        registry.load_models_from_config(&config).await.unwrap();

        let (tx, rx) = broadcast::channel(4);
        let task = tokio::spawn(Arc::clone(&registry).reload_on_change(rx));

        write_kernel(dir.path(), "clarity.json", 4.0).await;
        tx.send(model_path).unwrap();

        let mut reloaded = false;
        for _ in 0..200 {
            if run(&registry, "vocal-clarity", &[1.0]) == vec![4.0] {
                reloaded = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(reloaded);

        drop(tx);
        task.await.unwrap();
    }
}
