//! Dynamics processors: compressor and brickwall limiters

use super::{db_to_gain, params, prepared_spec, time_coeff, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Convert linear amplitude to dB (with minimum floor)
#[inline]
fn to_db(level: f32) -> f32 {
    if level < 1e-6 {
        params::DB_MIN
    } else {
        20.0 * level.log10()
    }
}

// ============================================================================
// DYNAMIC RANGE COMPRESSOR
// ============================================================================

/// Dynamic range compressor
///
/// Reduces the dynamic range of audio signals by attenuating
/// signals above a threshold. One envelope follower per channel.
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    spec: Option<ProcessSpec>,
    // Coefficients (pre-computed for performance)
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain: f32,
    envelopes: Vec<f32>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressorParams::default())
    }
}

impl Compressor {
    pub fn new(params: CompressorParams) -> Self {
        let mut comp = Self {
            params: CompressorParams::default(),
            spec: None,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_gain: 1.0,
            envelopes: Vec::new(),
        };
        comp.set_params(params);
        comp
    }

    /// Compressor tuned for transparent bus glue
    pub fn gentle() -> Self {
        Self::new(CompressorParams::gentle())
    }

    /// Set the threshold in dB
    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.params.threshold_db = threshold_db.clamp(params::DB_MIN, 0.0);
    }

    /// Set the compression ratio (1:1 = no compression, 20:1 = limiter)
    pub fn set_ratio(&mut self, ratio: f32) {
        self.params.ratio = ratio.clamp(params::RATIO_MIN, params::RATIO_MAX);
    }

    /// Set the attack time in milliseconds
    pub fn set_attack(&mut self, attack_ms: f32) {
        self.params.attack_ms = attack_ms.clamp(params::ATTACK_MS_MIN, params::ATTACK_MS_MAX);
        self.update_coefficients();
    }

    /// Set the release time in milliseconds
    pub fn set_release(&mut self, release_ms: f32) {
        self.params.release_ms =
            release_ms.clamp(params::RELEASE_MS_MIN, params::RELEASE_MS_MAX);
        self.update_coefficients();
    }

    /// Set the make-up gain in dB
    pub fn set_makeup_gain(&mut self, gain_db: f32) {
        self.params.makeup_gain_db = gain_db.clamp(0.0, params::DB_MAX);
        self.makeup_gain = db_to_gain(self.params.makeup_gain_db);
    }

    fn sample_rate(&self) -> f32 {
        self.spec
            .map(|s| s.sample_rate_f32())
            .unwrap_or(ProcessSpec::default().sample_rate_f32())
    }

    /// Update envelope filter coefficients
    fn update_coefficients(&mut self) {
        let sample_rate = self.sample_rate();
        self.attack_coeff = time_coeff(self.params.attack_ms, sample_rate);
        self.release_coeff = time_coeff(self.params.release_ms, sample_rate);
    }

    /// Calculate gain reduction for a given input level
    ///
    /// Returns the linear gain to apply (1.0 = no reduction)
    #[inline]
    fn calculate_gain(&self, input_level_db: f32) -> f32 {
        if input_level_db <= self.params.threshold_db {
            return 1.0;
        }
        let over_threshold = input_level_db - self.params.threshold_db;
        let gain_reduction_db = over_threshold * (1.0 - 1.0 / self.params.ratio);
        10.0_f32.powf(-gain_reduction_db / 20.0)
    }

    /// Update envelope follower (peak detection with smoothing)
    #[inline]
    fn follow(&self, input_sample: f32, envelope: f32) -> f32 {
        let input_level = input_sample.abs();
        let coeff = if input_level > envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        coeff * envelope + (1.0 - coeff) * input_level
    }

    /// Compress one channel slice using the envelope slot `ch`
    pub(crate) fn process_channel(&mut self, ch: usize, samples: &mut [f32]) {
        let mut envelope = self.envelopes[ch];
        for sample in samples.iter_mut() {
            envelope = self.follow(*sample, envelope);
            *sample *= self.calculate_gain(to_db(envelope)) * self.makeup_gain;
        }
        self.envelopes[ch] = envelope;
    }

    /// Get current parameter values
    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// Set all parameters at once
    pub fn set_params(&mut self, params: CompressorParams) {
        self.set_threshold(params.threshold_db);
        self.set_ratio(params.ratio);
        self.set_attack(params.attack_ms);
        self.set_release(params.release_ms);
        self.set_makeup_gain(params.makeup_gain_db);
        trace!(
            "Compressor updated: {:.1}dB {:.1}:1 {:.1}ms/{:.0}ms",
            self.params.threshold_db,
            self.params.ratio,
            self.params.attack_ms,
            self.params.release_ms
        );
    }
}

impl Effect for Compressor {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        if self.envelopes.len() < spec.channels {
            self.envelopes.resize(spec.channels, 0.0);
        }
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        for ch in 0..buffer.num_channels() {
            self.process_channel(ch, buffer.channel_mut(ch));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelopes.fill(0.0);
    }

    fn name(&self) -> &str {
        "Compressor"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "threshold" => Some(self.params.threshold_db),
            "ratio" => Some(self.params.ratio),
            "attack" => Some(self.params.attack_ms),
            "release" => Some(self.params.release_ms),
            "makeup" => Some(self.params.makeup_gain_db),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            "makeup" => self.set_makeup_gain(value),
            _ => return false,
        }
        true
    }
}

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_gain_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -10.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
        }
    }
}

impl CompressorParams {
    pub fn gentle() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 2.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
        }
    }
}

// ============================================================================
// LIMITER
// ============================================================================

/// Peak limiter with a hard output ceiling
///
/// The envelope rides the signal peak; gain is `threshold / envelope` above
/// the threshold, and the ceiling clamp catches whatever the envelope misses.
#[derive(Debug, Clone)]
pub struct Limiter {
    params: LimiterParams,
    spec: Option<ProcessSpec>,
    attack_coeff: f32,
    release_coeff: f32,
    envelopes: Vec<f32>,
    name: &'static str,
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(LimiterParams::default())
    }
}

impl Limiter {
    pub fn new(params: LimiterParams) -> Self {
        let mut limiter = Self {
            params: LimiterParams::default(),
            spec: None,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelopes: Vec::new(),
            name: "Limiter",
        };
        limiter.set_params(params);
        limiter
    }

    fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.params.threshold_db = threshold_db.clamp(-24.0, 0.0);
    }

    pub fn set_ceiling(&mut self, ceiling_db: f32) {
        self.params.ceiling_db = ceiling_db.clamp(-12.0, 0.0);
    }

    pub fn set_attack(&mut self, attack_ms: f32) {
        self.params.attack_ms = attack_ms.clamp(0.1, 50.0);
        self.update_coefficients();
    }

    pub fn set_release(&mut self, release_ms: f32) {
        self.params.release_ms = release_ms.clamp(1.0, 500.0);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        let sample_rate = self
            .spec
            .map(|s| s.sample_rate_f32())
            .unwrap_or(ProcessSpec::default().sample_rate_f32());
        self.attack_coeff = time_coeff(self.params.attack_ms, sample_rate);
        self.release_coeff = time_coeff(self.params.release_ms, sample_rate);
    }

    pub fn params(&self) -> LimiterParams {
        self.params
    }

    pub fn set_params(&mut self, params: LimiterParams) {
        self.set_threshold(params.threshold_db);
        self.set_ceiling(params.ceiling_db);
        self.set_attack(params.attack_ms);
        self.set_release(params.release_ms);
    }
}

impl Effect for Limiter {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        if self.envelopes.len() < spec.channels {
            self.envelopes.resize(spec.channels, 0.0);
        }
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;

        let threshold = db_to_gain(self.params.threshold_db);
        let ceiling = db_to_gain(self.params.ceiling_db);

        for ch in 0..buffer.num_channels() {
            let mut envelope = self.envelopes[ch];
            for sample in buffer.channel_mut(ch).iter_mut() {
                let level = sample.abs();
                let coeff = if level > envelope {
                    self.attack_coeff
                } else {
                    self.release_coeff
                };
                envelope = coeff * envelope + (1.0 - coeff) * level;
                // Never let the detector lag below the instantaneous peak
                let detector = envelope.max(level);
                let gain = if detector > threshold {
                    threshold / detector
                } else {
                    1.0
                };
                *sample = (*sample * gain).clamp(-ceiling, ceiling);
            }
            self.envelopes[ch] = envelope;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelopes.fill(0.0);
    }

    fn name(&self) -> &str {
        self.name
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "threshold" => Some(self.params.threshold_db),
            "ceiling" => Some(self.params.ceiling_db),
            "attack" => Some(self.params.attack_ms),
            "release" => Some(self.params.release_ms),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "threshold" => self.set_threshold(value),
            "ceiling" => self.set_ceiling(value),
            "attack" => self.set_attack(value),
            "release" => self.set_release(value),
            _ => return false,
        }
        true
    }
}

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub ceiling_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -1.0,
            ceiling_db: -0.1,
            attack_ms: 0.5,
            release_ms: 50.0,
        }
    }
}

// ============================================================================
// FINAL LIMITER
// ============================================================================

/// Last stage of the mastering chain: threshold tracks the ceiling
#[derive(Debug, Clone)]
pub struct FinalLimiter {
    inner: Limiter,
}

impl Default for FinalLimiter {
    fn default() -> Self {
        Self::new(-0.1)
    }
}

impl FinalLimiter {
    pub fn new(ceiling_db: f32) -> Self {
        let mut limiter = Self {
            inner: Limiter::default().with_name("Final Limiter"),
        };
        limiter.set_ceiling(ceiling_db);
        limiter
    }

    pub fn set_ceiling(&mut self, ceiling_db: f32) {
        self.inner.set_ceiling(ceiling_db);
        self.inner.set_threshold(self.inner.params().ceiling_db);
    }

    pub fn ceiling(&self) -> f32 {
        self.inner.params().ceiling_db
    }

    pub fn set_release(&mut self, release_ms: f32) {
        self.inner.set_release(release_ms);
    }
}

impl Effect for FinalLimiter {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.inner.prepare(spec);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.inner.process(buffer)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        self.inner.parameter(name)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "ceiling" => {
                self.set_ceiling(value);
                true
            }
            _ => self.inner.set_parameter(name, value),
        }
    }
}
