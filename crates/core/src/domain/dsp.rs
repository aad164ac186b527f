//! Digital Signal Processing stages for the effects pipeline
//!
//! This module provides the uniform [`Effect`] capability and every concrete
//! stage built on it:
//! - Primitive stages: biquad/crossover filters, compressor and limiter,
//!   delay line, chorus, saturator
//! - Composite algorithms: multiband compressor, space reverb, de-esser,
//!   transient shaper, stereo imager, loudness normalizer
//! - Vocal timbre shaping for the pitch/harmony clone
//!
//! All stages are designed for:
//! - Zero allocations in `process` (scratch memory is sized in `prepare`)
//! - In-place processing of planar blocks
//! - Fail-open behaviour: a rejected block is left untouched

pub mod deesser;
pub mod delay;
pub mod dynamics;
pub mod eq;
pub mod filter;
pub mod imager;
pub mod loudness;
pub mod modulation;
pub mod multiband;
pub mod reverb;
pub mod saturation;
pub mod transient;
pub mod vocal;

use crate::domain::audio::{AudioBuffer, AudioError, ProcessSpec};

pub use deesser::{DeEsser, DeEsserParams};
pub use delay::{DelayLine, SubtleDelay, SubtleDelayParams};
pub use dynamics::{Compressor, CompressorParams, FinalLimiter, Limiter, LimiterParams};
pub use eq::{Equalizer, EqualizerParams, HighPassFilter, PresenceEq, PresenceEqParams};
pub use filter::{BiquadCoeffs, BiquadFilter, ChannelFilters, Crossover, CrossoverKind};
pub use imager::{StereoImager, StereoImagerParams};
pub use loudness::{LoudnessNormalizer, LoudnessNormalizerParams};
pub use modulation::{Modulation, ModulationParams};
pub use multiband::{Band, BandSettings, MultibandCompressor, MultibandParams};
pub use reverb::{
    CinematicReverb, CinematicReverbParams, LateReverb, Reverb, ReverbParams, SpaceReverb,
    SpaceReverbParams,
};
pub use saturation::{Saturator, SaturatorParams};
pub use transient::{TransientShaper, TransientShaperParams};
pub use vocal::{HarmonyMode, VocalTimbre, VocalTimbreParams};

pub type Result<T> = std::result::Result<T, AudioError>;

/// Core trait for all audio effects
///
/// DSP stages and the AI bridge both implement this so chains can order
/// and dispatch them uniformly.
pub trait Effect: Send + Sync {
    /// Allocate state for `spec`
    ///
    /// # Requirements
    /// - Idempotent, callable again on sample-rate or block-size change
    /// - Scratch buffers grow to the largest block size ever seen
    fn prepare(&mut self, spec: &ProcessSpec);

    /// Process a block in place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Exactly `buffer.num_samples()` samples per channel are touched
    /// - On error the buffer is left unmodified
    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()>;

    /// Clear filter, envelope and delay history without touching parameters
    fn reset(&mut self);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;

    /// Read a named parameter, if the effect exposes it
    fn parameter(&self, _name: &str) -> Option<f32> {
        None
    }

    /// Write a named parameter, returning whether it was recognised
    fn set_parameter(&mut self, _name: &str, _value: f32) -> bool {
        false
    }
}

/// Parameter constraints for DSP effects
///
/// All parameters are clamped to these ranges to prevent
/// invalid states and ensure numerical stability.
pub mod params {
    /// Level treated as silence by the decibel helpers
    pub const MINUS_INFINITY_DB: f32 = -100.0;

    /// Decibel range for thresholds
    pub const DB_MIN: f32 = -60.0;
    pub const DB_MAX: f32 = 24.0;

    /// Compressor ratio range (1:1 to 20:1)
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 20.0;

    /// Attack/Release time ranges in milliseconds
    pub const ATTACK_MS_MIN: f32 = 0.1;
    pub const ATTACK_MS_MAX: f32 = 500.0;
    pub const RELEASE_MS_MIN: f32 = 1.0;
    pub const RELEASE_MS_MAX: f32 = 2000.0;

    /// Shelf/peak gain range in dB
    pub const EQ_GAIN_MIN: f32 = -12.0;
    pub const EQ_GAIN_MAX: f32 = 12.0;

    /// Output trim range in dB
    pub const OUTPUT_DB_MIN: f32 = -24.0;
    pub const OUTPUT_DB_MAX: f32 = 12.0;

    /// Butterworth Q, two cascaded sections give a Linkwitz-Riley response
    pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db <= params::MINUS_INFINITY_DB {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Convert linear gain to decibels
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        params::MINUS_INFINITY_DB
    } else {
        (20.0 * gain.log10()).max(params::MINUS_INFINITY_DB)
    }
}

/// One-pole smoothing coefficient for a time constant in milliseconds
#[inline]
pub fn time_coeff(ms: f32, sample_rate: f32) -> f32 {
    let samples = (ms * 0.001 * sample_rate).max(f32::MIN_POSITIVE);
    (-1.0 / samples).exp()
}

/// Check a block against the prepared spec of a stage
#[inline]
pub(crate) fn prepared_spec(spec: &Option<ProcessSpec>, buffer: &AudioBuffer) -> Result<ProcessSpec> {
    let spec = spec.ok_or(AudioError::NotPrepared)?;
    spec.check_block(buffer)?;
    Ok(spec)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub const SAMPLE_RATE: f64 = 48000.0;
    pub const BLOCK: usize = 512;

    pub fn spec() -> ProcessSpec {
        ProcessSpec::new(SAMPLE_RATE, BLOCK, 2)
    }

    pub fn generate_sine(samples: usize, frequency: f32, amplitude: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32)
                        .sin()
            })
            .collect()
    }

    pub fn stereo_sine(samples: usize, frequency: f32, amplitude: f32) -> AudioBuffer {
        let signal = generate_sine(samples, frequency, amplitude);
        AudioBuffer::from_channels(vec![signal.clone(), signal])
    }

    pub fn silence(samples: usize) -> AudioBuffer {
        AudioBuffer::new(2, samples)
    }

    /// Process a long signal in `BLOCK`-sized chunks
    pub fn process_blocks(effect: &mut dyn Effect, input: &AudioBuffer) -> AudioBuffer {
        let mut output = input.clone();
        let channels = input.num_channels();
        let mut block = AudioBuffer::new(channels, BLOCK);
        let mut start = 0;
        while start < input.num_samples() {
            let len = BLOCK.min(input.num_samples() - start);
            block.set_num_samples(len).unwrap();
            for ch in 0..channels {
                block
                    .channel_mut(ch)
                    .copy_from_slice(&input.channel(ch)[start..start + len]);
            }
            effect.process(&mut block).unwrap();
            for ch in 0..channels {
                output.channel_mut(ch)[start..start + len].copy_from_slice(block.channel(ch));
            }
            start += len;
        }
        output
    }

    /// Reset twice, then check a silent block stays silent
    pub fn assert_reset_clears(effect: &mut dyn Effect) {
        let mut loud = stereo_sine(BLOCK, 440.0, 0.8);
        effect.process(&mut loud).unwrap();
        effect.reset();
        effect.reset();
        let mut quiet = silence(BLOCK);
        effect.process(&mut quiet).unwrap();
        assert!(
            quiet.peak() < 1e-6,
            "{} left residual energy after reset: {}",
            effect.name(),
            quiet.peak()
        );
    }
}
