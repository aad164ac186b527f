//! Audio block and processing-spec abstractions
//!
//! Every stage in the pipeline works on a planar [`AudioBuffer`] whose
//! per-channel storage is sized once, at prepare time, to the largest block
//! the host has announced. Processing never reallocates: a block only moves
//! its active length (`num_samples`) within that fixed capacity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error, PartialEq)]
pub enum AudioError {
    /// A stage was asked to process before `prepare` was called
    #[error("Stage not prepared")]
    NotPrepared,

    /// Block is longer than the prepared maximum block size
    #[error("Block too large: {requested} samples (capacity {capacity})")]
    BlockTooLarge { requested: usize, capacity: usize },

    /// Block carries more channels than the stage was prepared for
    #[error("Channel mismatch: {requested} channels (prepared for {capacity})")]
    ChannelMismatch { requested: usize, capacity: usize },

    /// Invalid configuration for a stage or stream
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Processing configuration shared by every stateful stage
///
/// All stages of one pipeline must be prepared with the same spec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub channels: usize,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            max_block_size: 512,
            channels: 2,
        }
    }
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize, channels: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            channels,
        }
    }

    /// Reject specs no stage can be prepared with
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AudioError::InvalidConfiguration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "max block size must be non-zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidConfiguration(
                "channel count must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that `buffer` fits inside this spec
    #[inline]
    pub fn check_block(&self, buffer: &AudioBuffer) -> Result<()> {
        if buffer.num_samples() > self.max_block_size {
            return Err(AudioError::BlockTooLarge {
                requested: buffer.num_samples(),
                capacity: self.max_block_size,
            });
        }
        if buffer.num_channels() > self.channels {
            return Err(AudioError::ChannelMismatch {
                requested: buffer.num_channels(),
                capacity: self.channels,
            });
        }
        Ok(())
    }

    /// Convert a duration in milliseconds to a whole number of samples
    #[inline]
    pub fn ms_to_samples(&self, ms: f32) -> usize {
        (ms.max(0.0) as f64 * self.sample_rate / 1000.0).round() as usize
    }

    pub fn sample_rate_f32(&self) -> f32 {
        self.sample_rate as f32
    }
}

/// Planar multichannel audio block with fixed capacity
///
/// Channel storage is allocated up front; `num_samples` is the active block
/// length and never exceeds `capacity`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl AudioBuffer {
    /// Create a silent buffer whose active length equals its capacity
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; num_channels],
            num_samples: capacity,
        }
    }

    /// Create a buffer sized for `spec`, with an empty active region
    pub fn for_spec(spec: &ProcessSpec) -> Self {
        let mut buffer = Self::new(spec.channels, spec.max_block_size);
        buffer.num_samples = 0;
        buffer
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(len, 0.0);
        }
        Self {
            channels,
            num_samples: len,
        }
    }

    /// De-interleave `samples` into a new buffer
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Self {
        let num_channels = num_channels.max(1);
        let frames = samples.len() / num_channels;
        let mut buffer = Self::new(num_channels, frames);
        for (frame, chunk) in samples.chunks_exact(num_channels).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                buffer.channels[ch][frame] = sample;
            }
        }
        buffer
    }

    /// Load interleaved samples into the existing storage without allocating
    pub fn read_interleaved(&mut self, samples: &[f32]) -> Result<()> {
        let num_channels = self.num_channels().max(1);
        let frames = samples.len() / num_channels;
        self.set_num_samples(frames)?;
        for (frame, chunk) in samples.chunks_exact(num_channels).enumerate() {
            for (ch, &sample) in chunk.iter().enumerate() {
                self.channels[ch][frame] = sample;
            }
        }
        Ok(())
    }

    /// Interleave the active region into `out`, returning the samples written
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let num_channels = self.num_channels();
        if num_channels == 0 {
            return 0;
        }
        let frames = (out.len() / num_channels).min(self.num_samples);
        for frame in 0..frames {
            for ch in 0..num_channels {
                out[frame * num_channels + ch] = self.channels[ch][frame];
            }
        }
        frames * num_channels
    }

    /// Grow storage to at least `num_channels` x `capacity`
    ///
    /// Storage never shrinks, so a buffer sized once for the largest block
    /// ever announced stays valid for every smaller one.
    pub fn ensure_capacity(&mut self, num_channels: usize, capacity: usize) {
        let capacity = capacity.max(self.capacity());
        if self.channels.len() < num_channels {
            self.channels.resize_with(num_channels, Vec::new);
        }
        for channel in &mut self.channels {
            if channel.len() < capacity {
                channel.resize(capacity, 0.0);
            }
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn capacity(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    /// Change the active block length within the allocated capacity
    pub fn set_num_samples(&mut self, num_samples: usize) -> Result<()> {
        if num_samples > self.capacity() {
            return Err(AudioError::BlockTooLarge {
                requested: num_samples,
                capacity: self.capacity(),
            });
        }
        self.num_samples = num_samples;
        Ok(())
    }

    /// Active samples of one channel
    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch][..self.num_samples]
    }

    /// Mutable active samples of one channel
    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let n = self.num_samples;
        &mut self.channels[ch][..n]
    }

    /// Iterate over the active region of every channel
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        let n = self.num_samples;
        self.channels.iter().map(move |c| &c[..n])
    }

    /// Iterate mutably over the active region of every channel
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let n = self.num_samples;
        self.channels.iter_mut().map(move |c| &mut c[..n])
    }

    /// Borrow the first two channels at once
    pub fn stereo_mut(&mut self) -> Option<(&mut [f32], &mut [f32])> {
        if self.channels.len() < 2 {
            return None;
        }
        let n = self.num_samples;
        let (left, rest) = self.channels.split_at_mut(1);
        Some((&mut left[0][..n], &mut rest[0][..n]))
    }

    /// Copy the active region of `other` into this buffer
    pub fn copy_from(&mut self, other: &AudioBuffer) -> Result<()> {
        if other.num_channels() > self.num_channels() {
            return Err(AudioError::ChannelMismatch {
                requested: other.num_channels(),
                capacity: self.num_channels(),
            });
        }
        self.set_num_samples(other.num_samples())?;
        for (dst, src) in self.channels.iter_mut().zip(other.channels()) {
            dst[..src.len()].copy_from_slice(src);
        }
        Ok(())
    }

    /// Zero the active region
    pub fn clear(&mut self) {
        for channel in self.channels_mut() {
            channel.fill(0.0);
        }
    }

    /// Multiply the active region by a linear gain
    pub fn apply_gain(&mut self, gain: f32) {
        for channel in self.channels_mut() {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// RMS over all channels of the active region
    pub fn rms(&self) -> f32 {
        let count = self.num_samples * self.num_channels();
        if count == 0 {
            return 0.0;
        }
        let sum_sq: f32 = self
            .channels()
            .flat_map(|c| c.iter())
            .map(|s| s * s)
            .sum();
        (sum_sq / count as f32).sqrt()
    }

    /// Absolute peak over all channels of the active region
    pub fn peak(&self) -> f32 {
        self.channels()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }
}
