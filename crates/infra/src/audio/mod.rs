//! Audio file and device adapters
//!
//! - `wav`: WAV read/write through hound into planar buffers
//! - `render`: offline block-by-block processing of a whole buffer
//! - `stream`: live playback through CPAL, which abstracts
//!   platform-specific APIs:
//!   - Windows: WASAPI
//!   - Linux: ALSA/PulseAudio
//!   - macOS: CoreAudio

pub mod render;
pub mod stream;
pub mod wav;

pub use render::{render_offline, RENDER_BLOCK_SIZE};
pub use stream::PlaybackStream;
pub use wav::{read_wav, write_wav, WavAudio, WavError};
