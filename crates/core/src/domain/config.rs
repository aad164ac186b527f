//! Configuration management for Cadenza
//!
//! This module provides:
//! - Configuration structs for the session, its tracks, mastering and the FX suite
//! - Mastering preset files with TOML serialization
//! - The main config file in the platform config directory
//! - Hot-reload support via file system watcher

use crate::domain::ai::InferenceBackend;
use crate::domain::audio::ProcessSpec;
use crate::domain::chain::{EffectMode, TrackKind};
use crate::domain::dsp::{
    CinematicReverb, Compressor, DeEsser, Effect, Equalizer, HighPassFilter, Limiter,
    LoudnessNormalizer, Modulation, MultibandCompressor, PresenceEq, Reverb, Saturator,
    SpaceReverb, StereoImager, SubtleDelay, TransientShaper,
};
use crate::domain::mastering::{MasteringParams, MasteringPreset};
use crate::domain::processor::SessionProcessor;
use crate::domain::suite::{AbCompare, FxSuite, SuiteState, VocalClone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Processing sample rate when no input file dictates one
    pub sample_rate: u32,

    /// Largest block the host will deliver, in frames
    pub block_size: u32,

    /// Channel count of the session bus
    pub channels: u16,

    /// Mastering preset directory
    pub preset_dir: PathBuf,

    /// Held-peak meter decay in dB per second
    pub meter_decay_rate: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            preset_dir: PathBuf::from("presets"),
            meter_decay_rate: 12.0,
        }
    }
}

impl AppConfig {
    /// Processing spec for this configuration
    pub fn to_spec(&self) -> ProcessSpec {
        ProcessSpec::new(
            self.sample_rate as f64,
            self.block_size as usize,
            self.channels as usize,
        )
    }
}

// ============================================================================
// EFFECTS AND TRACKS
// ============================================================================

/// Effects that can be placed on a track's DSP list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Equalizer,
    Compressor,
    Reverb,
    Limiter,
    HighPass,
    PresenceEq,
    Delay,
    Modulation,
    Saturation,
    CinematicReverb,
    Multiband,
    SpaceReverb,
    DeEsser,
    TransientShaper,
    StereoImager,
    LoudnessNormalizer,
    VocalClone,
    FxSuite,
}

impl EffectKind {
    /// Construct the effect with its factory parameters
    pub fn build(self) -> Box<dyn Effect> {
        match self {
            EffectKind::Equalizer => Box::new(Equalizer::new()),
            EffectKind::Compressor => Box::new(Compressor::default()),
            EffectKind::Reverb => Box::new(Reverb::default()),
            EffectKind::Limiter => Box::new(Limiter::default()),
            EffectKind::HighPass => Box::new(HighPassFilter::default()),
            EffectKind::PresenceEq => Box::new(PresenceEq::default()),
            EffectKind::Delay => Box::new(SubtleDelay::default()),
            EffectKind::Modulation => Box::new(Modulation::default()),
            EffectKind::Saturation => Box::new(Saturator::default()),
            EffectKind::CinematicReverb => Box::new(CinematicReverb::default()),
            EffectKind::Multiband => Box::new(MultibandCompressor::default()),
            EffectKind::SpaceReverb => Box::new(SpaceReverb::default()),
            EffectKind::DeEsser => Box::new(DeEsser::default()),
            EffectKind::TransientShaper => Box::new(TransientShaper::default()),
            EffectKind::StereoImager => Box::new(StereoImager::default()),
            EffectKind::LoudnessNormalizer => Box::new(LoudnessNormalizer::default()),
            EffectKind::VocalClone => Box::new(VocalClone::default()),
            EffectKind::FxSuite => Box::new(FxSuite::new()),
        }
    }
}

/// One effect on a track, with parameter overrides by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub kind: EffectKind,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    /// Build the effect and apply every override it recognises
    pub fn build(&self) -> Box<dyn Effect> {
        let mut effect = self.kind.build();
        self.apply_params(effect.as_mut());
        effect
    }

    fn apply_params(&self, effect: &mut dyn Effect) {
        for (name, value) in &self.params {
            if !effect.set_parameter(name, *value) {
                warn!("{} has no parameter '{}', ignoring", effect.name(), name);
            }
        }
    }
}

/// Track configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub name: String,
    #[serde(default)]
    pub mode: EffectMode,
    /// DSP list, in processing order
    #[serde(default)]
    pub dsp: Vec<EffectConfig>,
    /// Inference roles for the AI list, in processing order
    #[serde(default)]
    pub ai_roles: Vec<String>,
}

impl TrackConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: EffectMode::Off,
            dsp: Vec::new(),
            ai_roles: Vec::new(),
        }
    }
}

/// Mastering chain configuration
///
/// The preset is applied first, then `overrides` replace every setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteringConfig {
    pub enabled: bool,
    #[serde(default)]
    pub preset: Option<MasteringPreset>,
    #[serde(default)]
    pub overrides: Option<MasteringParams>,
}

impl Default for MasteringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: Some(MasteringPreset::CinematicVocal),
            overrides: None,
        }
    }
}

/// Vocal FX suite configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub state: SuiteState,
    #[serde(default)]
    pub ab_compare: AbCompare,
}

impl SuiteConfig {
    pub fn apply(&self, suite: &mut FxSuite) {
        suite.set_state(self.state);
        suite.set_ab_compare(self.ab_compare);
    }
}

/// Inference configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiConfig {
    /// JSON map of model role to model file
    #[serde(default)]
    pub model_map: Option<PathBuf>,

    /// Reload the model map when it changes on disk
    #[serde(default)]
    pub hot_reload: bool,
}

/// Complete Cadenza configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenzaConfig {
    pub app: AppConfig,
    pub tracks: Vec<TrackConfig>,
    #[serde(default)]
    pub mastering: MasteringConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl Default for CadenzaConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            tracks: TrackKind::ALL
                .iter()
                .map(|kind| TrackConfig::new(kind.label()))
                .collect(),
            mastering: MasteringConfig::default(),
            suite: SuiteConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl CadenzaConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Reject settings that cannot produce a working session
    pub fn validate(&self) -> Result<()> {
        self.app
            .to_spec()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.tracks.len() > TrackKind::ALL.len() {
            return Err(ConfigError::Invalid(format!(
                "{} tracks configured, at most {} supported",
                self.tracks.len(),
                TrackKind::ALL.len()
            )));
        }
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        let mut config = Self::default();

        let vocal = &mut config.tracks[TrackKind::Vocal.index()];
        vocal.mode = EffectMode::Dsp;
        vocal.dsp = vec![
            EffectConfig::new(EffectKind::HighPass),
            EffectConfig::new(EffectKind::DeEsser),
            EffectConfig::new(EffectKind::Compressor)
                .with_param("threshold", -18.0)
                .with_param("ratio", 3.0),
        ];
        vocal.ai_roles = vec!["vocal-clarity".to_string()];

        let bass = &mut config.tracks[TrackKind::Bass808.index()];
        bass.mode = EffectMode::Dsp;
        bass.dsp = vec![
            EffectConfig::new(EffectKind::Saturation).with_param("drive", 0.3),
            EffectConfig::new(EffectKind::Limiter),
        ];

        let hihat = &mut config.tracks[TrackKind::HiHat.index()];
        hihat.dsp = vec![EffectConfig::new(EffectKind::TransientShaper)];

        config
    }

    /// Configure a session from this config
    ///
    /// Tracks beyond the session's track count are skipped.
    pub fn apply_to(&self, session: &mut SessionProcessor, backend: Arc<dyn InferenceBackend>) {
        for (index, track) in self.tracks.iter().enumerate() {
            if index >= session.chains().num_tracks() {
                warn!("Track '{}' has no slot in the session, skipping", track.name);
                continue;
            }
            let chains = session.chains_mut();
            chains.clear_effects(index);
            for effect in &track.dsp {
                chains.add_dsp_effect(index, self.build_effect(effect, &backend));
            }
            for role in &track.ai_roles {
                chains.add_inference_effect(index, role, Arc::clone(&backend));
            }
            chains.set_mode(index, track.mode);
        }

        session.set_enhancer_enabled(self.mastering.enabled);
        let mastering = session.mastering_mut();
        if let Some(preset) = self.mastering.preset {
            mastering.apply_preset(preset);
        }
        if let Some(overrides) = self.mastering.overrides {
            mastering.set_params(overrides);
        }
        debug!("Session configured with {} tracks", self.tracks.len());
    }

    /// Build a track effect, wiring in the suite settings and the backend
    /// for the stages that use them
    fn build_effect(
        &self,
        config: &EffectConfig,
        backend: &Arc<dyn InferenceBackend>,
    ) -> Box<dyn Effect> {
        match config.kind {
            EffectKind::FxSuite => {
                let mut suite = FxSuite::new();
                self.suite.apply(&mut suite);
                suite
                    .vocal_clone_mut()
                    .attach_backend(Arc::clone(backend));
                config.apply_params(&mut suite);
                Box::new(suite)
            }
            EffectKind::VocalClone => {
                let mut clone = VocalClone::default();
                clone.attach_backend(Arc::clone(backend));
                config.apply_params(&mut clone);
                Box::new(clone)
            }
            _ => config.build(),
        }
    }
}

// ============================================================================
// HOT RELOAD
// ============================================================================

/// File system watcher for hot-reload of presets and model maps
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `dir` recursively for `.toml` and `.json` changes
    pub async fn new(dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if is_watched_file(&path) {
                            if let Err(e) = tx_clone.send(path) {
                                debug!("No subscriber for config change: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&dir, notify::RecursiveMode::Recursive)?;

        info!(path = %dir.display(), "Config watcher started");

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

fn is_watched_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("toml") | Some("json")
    )
}

// ============================================================================
// PRESETS
// ============================================================================

/// Named mastering presets stored as TOML files
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ConfigError::Invalid(format!("invalid preset name '{}'", name)));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<MasteringParams> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save a preset by name, replacing any existing one
    #[instrument(skip(self, params))]
    pub async fn save_preset(&self, name: &str, params: &MasteringParams) -> Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.preset_dir).await?;
        fs::write(&path, toml::to_string_pretty(params)?).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }
}

// ============================================================================
// MAIN CONFIG FILE
// ============================================================================

/// Manages the main configuration file at `<config dir>/cadenza/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Platform config directory for Cadenza
    ///
    /// `~/.config/cadenza` on Linux, the equivalent elsewhere.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("cadenza"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields (and writes) the factory default. A corrupt
    /// file is backed up next to itself and the factory default returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CadenzaConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = CadenzaConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match CadenzaConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                CadenzaConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &CadenzaConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file if present
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(path = %self.config_path.display(), "Configuration cleared");
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ai::NoBackend;
    use crate::domain::chain::ChainSlot;
    use tempfile::TempDir;

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_serialization() {
        let config = CadenzaConfig::factory_default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CadenzaConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_default_tracks() {
        let config = CadenzaConfig::default();
        let names: Vec<_> = config.tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Vocal", "808", "HiHat", "Snare", "Piano", "Synth"]);
        assert!(config.tracks.iter().all(|t| t.mode == EffectMode::Off));
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let toml_str = r#"
            tracks = []

            [app]
            sample_rate = 44100
            block_size = 256
            channels = 2
            preset_dir = "presets"
            meter_decay_rate = 12.0
        "#;
        let config: CadenzaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.app.to_spec().max_block_size, 256);
        assert_eq!(config.mastering, MasteringConfig::default());
        assert_eq!(config.suite.state, SuiteState::default());
        assert!(config.ai.model_map.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_spec() {
        let mut config = CadenzaConfig::default();
        config.app.block_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CadenzaConfig::default();
        config.tracks.push(TrackConfig::new("Extra"));
        assert!(config.validate().is_err());
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    #[test]
    fn test_effect_config_applies_overrides() {
        let effect = EffectConfig::new(EffectKind::Compressor)
            .with_param("threshold", -30.0)
            .with_param("not_a_param", 1.0)
            .build();
        assert_eq!(effect.name(), "Compressor");
        assert_eq!(effect.parameter("threshold"), Some(-30.0));
    }

    #[test]
    fn test_effect_kinds_build() {
        assert_eq!(EffectKind::DeEsser.build().name(), "De-Esser");
        assert_eq!(EffectKind::SpaceReverb.build().name(), "Space Reverb");
        assert_eq!(EffectKind::VocalClone.build().name(), "Vocal Clone");
        assert_eq!(EffectKind::FxSuite.build().name(), "FX Suite");
    }

    #[test]
    fn test_apply_to_session() {
        let config = CadenzaConfig::factory_default();
        let (mut session, _controller) = SessionProcessor::new(config.app.to_spec());
        config.apply_to(&mut session, Arc::new(NoBackend));

        let vocal = session.chains().track(0).unwrap();
        assert_eq!(vocal.mode, EffectMode::Dsp);
        assert_eq!(
            vocal.effect_names(ChainSlot::Dsp),
            vec!["High-Pass Filter", "De-Esser", "Compressor"]
        );
        assert_eq!(vocal.effect_names(ChainSlot::Ai), vec!["AI: vocal-clarity"]);
        assert_eq!(
            session
                .chains()
                .effect_parameter(0, ChainSlot::Dsp, 2, "ratio"),
            Some(3.0)
        );
        assert!(session.enhancer_enabled());
    }

    #[test]
    fn test_apply_to_wires_suite_config() {
        let mut config = CadenzaConfig::default();
        config.suite.state.saturation = true;
        config.suite.ab_compare.enabled = true;
        config.tracks[TrackKind::Synth.index()].mode = EffectMode::Dsp;
        config.tracks[TrackKind::Synth.index()].dsp = vec![EffectConfig::new(EffectKind::FxSuite)];

        let (mut session, _controller) = SessionProcessor::new(config.app.to_spec());
        config.apply_to(&mut session, Arc::new(NoBackend));

        let synth = TrackKind::Synth.index();
        let names = session.chains().track(synth).unwrap().effect_names(ChainSlot::Dsp);
        assert_eq!(names, vec!["FX Suite"]);
        let chains = session.chains();
        assert_eq!(
            chains.effect_parameter(synth, ChainSlot::Dsp, 0, "saturation.enabled"),
            Some(1.0)
        );
        assert_eq!(
            chains.effect_parameter(synth, ChainSlot::Dsp, 0, "vocal_clone.enabled"),
            Some(0.0)
        );
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_preset_manager() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());
        let params = MasteringParams::default();

        manager.save_preset("test_preset", &params).await.unwrap();
        assert!(manager.preset_exists("test_preset").await);

        let presets = manager.list_presets().await.unwrap();
        assert_eq!(presets, vec!["test_preset"]);

        let loaded = manager.load_preset("test_preset").await.unwrap();
        assert_eq!(loaded, params);

        manager.delete_preset("test_preset").await.unwrap();
        assert!(!manager.preset_exists("test_preset").await);
        assert!(matches!(
            manager.load_preset("test_preset").await,
            Err(ConfigError::PresetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preset_names_cannot_escape_dir() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());
        let result = manager
            .save_preset("../outside", &MasteringParams::default())
            .await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = CadenzaConfig::factory_default();
        config.save_to_file(&config_path).await.unwrap();
        assert!(config_path.exists());

        let loaded = CadenzaConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_config_manager_creates_default() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        assert!(!manager.exists());

        let config = manager.load().await;
        assert_eq!(config, CadenzaConfig::factory_default());
        assert!(manager.exists());

        manager.clear().await.unwrap();
        assert!(!manager.exists());
    }

    #[tokio::test]
    async fn test_config_manager_backs_up_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());
        fs::write(manager.config_path(), "not = [valid").await.unwrap();

        let config = manager.load().await;
        assert_eq!(config, CadenzaConfig::factory_default());
        assert!(temp_dir.path().join("config.toml.corrupt").exists());
    }

    #[tokio::test]
    async fn test_watcher_subscribes() {
        let temp_dir = TempDir::new().unwrap();
        let watch_dir = temp_dir.path().join("watched");
        let watcher = ConfigWatcher::new(watch_dir.clone()).await.unwrap();
        let _rx = watcher.subscribe();
        assert!(watch_dir.exists());
        assert!(is_watched_file(Path::new("models.json")));
        assert!(!is_watched_file(Path::new("notes.txt")));
    }
}
