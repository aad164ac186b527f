//! Domain entities and processing rules

pub mod ai;
pub mod audio;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod mastering;
pub mod metering;
pub mod processor;
pub mod suite;

// Re-export specific items to avoid ambiguous glob imports
pub use ai::{AiEffect, InferenceBackend, InferenceError, NoBackend, TensorShape};
pub use audio::{AudioBuffer, AudioError, ProcessSpec};
pub use chain::{
    control_channel, ChainCommand, ChainController, ChainError, ChainReceiver, ChainSlot,
    EffectMode, TrackChain, TrackChainManager, TrackKind, TRACK_COUNT,
};
pub use config::{
    AiConfig, AppConfig, CadenzaConfig, ConfigError, ConfigManager, ConfigWatcher, EffectConfig,
    EffectKind, MasteringConfig, PresetManager, SuiteConfig, TrackConfig,
};
pub use dsp::{db_to_gain, gain_to_db, Effect};
pub use mastering::{MasteringChain, MasteringParams, MasteringPreset, StageFlags};
pub use metering::{LevelMeter, MeterSnapshot, Meters};
pub use processor::{SessionProcessor, SessionState, Transport};
pub use suite::{AbCompare, FxSuite, SuiteState, VocalClone, PITCH_HARMONY_ROLE};
