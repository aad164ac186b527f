//! Adapters around the cadenza core: model registry, WAV files and
//! live playback through cpal.

pub mod audio;
pub mod inference;

pub use audio::{
    read_wav, render_offline, write_wav, PlaybackStream, WavAudio, WavError, RENDER_BLOCK_SIZE,
};
pub use inference::{
    InferenceModel, KernelLoader, KernelModel, ModelLoader, ModelRegistry, RegistryError,
};
