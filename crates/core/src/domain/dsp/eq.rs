//! Equalisation stages: 3-band track EQ, vocal high-pass and presence boost

use super::filter::{BiquadCoeffs, ChannelFilters};
use super::{params, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

fn sample_rate_of(spec: &Option<ProcessSpec>) -> f32 {
    spec.unwrap_or_default().sample_rate_f32()
}

// ============================================================================
// 3-BAND EQUALIZER
// ============================================================================

/// 3-band equalizer
///
/// Three independent bands:
/// - Low shelf at 200 Hz
/// - Mid peaking at 1 kHz (adjustable center frequency and Q)
/// - High shelf at 8 kHz
#[derive(Debug, Clone)]
pub struct Equalizer {
    params: EqualizerParams,
    spec: Option<ProcessSpec>,
    low: ChannelFilters,
    mid: ChannelFilters,
    high: ChannelFilters,
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Equalizer {
    /// Corner frequency of the low shelf
    pub const LOW_FREQ: f32 = 200.0;
    /// Default center frequency for mid band
    pub const DEFAULT_MID_FREQ: f32 = 1000.0;
    /// Corner frequency of the high shelf
    pub const HIGH_FREQ: f32 = 8000.0;

    const SHELF_Q: f32 = 0.7;

    pub fn new() -> Self {
        Self {
            params: EqualizerParams::default(),
            spec: None,
            low: ChannelFilters::default(),
            mid: ChannelFilters::default(),
            high: ChannelFilters::default(),
        }
    }

    /// Set the low shelf gain
    pub fn set_low_gain(&mut self, gain_db: f32) {
        self.params.low_gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.update_coefficients();
    }

    /// Set the mid band center frequency
    pub fn set_mid_freq(&mut self, freq: f32) {
        self.params.mid_freq = freq.clamp(200.0, 5000.0);
        self.update_coefficients();
    }

    /// Set the mid band gain
    pub fn set_mid_gain(&mut self, gain_db: f32) {
        self.params.mid_gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.update_coefficients();
    }

    /// Set the mid band Q factor
    pub fn set_mid_q(&mut self, q: f32) {
        self.params.mid_q = q.clamp(0.1, 5.0);
        self.update_coefficients();
    }

    /// Set the high shelf gain
    pub fn set_high_gain(&mut self, gain_db: f32) {
        self.params.high_gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.update_coefficients();
    }

    /// Update all filter coefficients based on current parameters
    fn update_coefficients(&mut self) {
        let sr = sample_rate_of(&self.spec);
        let p = &self.params;
        self.low.set_coeffs(BiquadCoeffs::low_shelf(
            sr,
            Self::LOW_FREQ,
            p.low_gain_db,
            Self::SHELF_Q,
        ));
        self.mid
            .set_coeffs(BiquadCoeffs::peaking(sr, p.mid_freq, p.mid_gain_db, p.mid_q));
        self.high.set_coeffs(BiquadCoeffs::high_shelf(
            sr,
            Self::HIGH_FREQ,
            p.high_gain_db,
            Self::SHELF_Q,
        ));

        trace!(
            "EQ updated: L={:.1}dB, M={:.1}dB@{:.0}Hz, H={:.1}dB",
            p.low_gain_db,
            p.mid_gain_db,
            p.mid_freq,
            p.high_gain_db
        );
    }

    /// Get current parameter values
    pub fn params(&self) -> EqualizerParams {
        self.params
    }

    /// Set all parameters at once
    pub fn set_params(&mut self, params: EqualizerParams) {
        self.params = EqualizerParams {
            low_gain_db: params.low_gain_db.clamp(-12.0, 12.0),
            mid_freq: params.mid_freq.clamp(200.0, 5000.0),
            mid_gain_db: params.mid_gain_db.clamp(-12.0, 12.0),
            mid_q: params.mid_q.clamp(0.1, 5.0),
            high_gain_db: params.high_gain_db.clamp(-12.0, 12.0),
        };
        self.update_coefficients();
    }
}

impl Effect for Equalizer {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.low.prepare(spec.channels);
        self.mid.prepare(spec.channels);
        self.high.prepare(spec.channels);
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        for ch in 0..buffer.num_channels() {
            let samples = buffer.channel_mut(ch);
            self.low.process_channel(ch, samples);
            self.mid.process_channel(ch, samples);
            self.high.process_channel(ch, samples);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }

    fn name(&self) -> &str {
        "Equalizer"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "low_gain" => Some(self.params.low_gain_db),
            "mid_freq" => Some(self.params.mid_freq),
            "mid_gain" => Some(self.params.mid_gain_db),
            "mid_q" => Some(self.params.mid_q),
            "high_gain" => Some(self.params.high_gain_db),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "low_gain" => self.set_low_gain(value),
            "mid_freq" => self.set_mid_freq(value),
            "mid_gain" => self.set_mid_gain(value),
            "mid_q" => self.set_mid_q(value),
            "high_gain" => self.set_high_gain(value),
            _ => return false,
        }
        true
    }
}

/// Equalizer parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerParams {
    pub low_gain_db: f32,
    pub mid_freq: f32,
    pub mid_gain_db: f32,
    pub mid_q: f32,
    pub high_gain_db: f32,
}

impl Default for EqualizerParams {
    fn default() -> Self {
        Self {
            low_gain_db: 0.0,
            mid_freq: Equalizer::DEFAULT_MID_FREQ,
            mid_gain_db: 0.0,
            mid_q: 1.0,
            high_gain_db: 0.0,
        }
    }
}

// ============================================================================
// HIGH-PASS FILTER
// ============================================================================

/// Removes rumble below the cutoff (80 Hz by default)
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    cutoff: f32,
    spec: Option<ProcessSpec>,
    filters: ChannelFilters,
}

impl Default for HighPassFilter {
    fn default() -> Self {
        Self::new(80.0)
    }
}

impl HighPassFilter {
    pub fn new(cutoff: f32) -> Self {
        let mut filter = Self {
            cutoff: 80.0,
            spec: None,
            filters: ChannelFilters::default(),
        };
        filter.set_cutoff(cutoff);
        filter
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff.clamp(20.0, 500.0);
        self.filters.set_coeffs(BiquadCoeffs::highpass(
            sample_rate_of(&self.spec),
            self.cutoff,
            params::BUTTERWORTH_Q,
        ));
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }
}

impl Effect for HighPassFilter {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.filters.prepare(spec.channels);
        self.set_cutoff(self.cutoff);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        for ch in 0..buffer.num_channels() {
            self.filters.process_channel(ch, buffer.channel_mut(ch));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.filters.reset();
    }

    fn name(&self) -> &str {
        "High-Pass Filter"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        (name == "cutoff").then_some(self.cutoff)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        if name == "cutoff" {
            self.set_cutoff(value);
            return true;
        }
        false
    }
}

// ============================================================================
// PRESENCE EQ
// ============================================================================

/// Peaking boost in the 1-8 kHz presence region
#[derive(Debug, Clone)]
pub struct PresenceEq {
    params: PresenceEqParams,
    spec: Option<ProcessSpec>,
    filters: ChannelFilters,
}

impl Default for PresenceEq {
    fn default() -> Self {
        Self::new(PresenceEqParams::default())
    }
}

impl PresenceEq {
    pub fn new(params: PresenceEqParams) -> Self {
        let mut eq = Self {
            params,
            spec: None,
            filters: ChannelFilters::default(),
        };
        eq.set_params(params);
        eq
    }

    pub fn set_frequency(&mut self, freq: f32) {
        self.params.frequency = freq.clamp(1000.0, 8000.0);
        self.update_coefficients();
    }

    pub fn set_gain(&mut self, gain_db: f32) {
        self.params.gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.update_coefficients();
    }

    pub fn set_q(&mut self, q: f32) {
        self.params.q = q.clamp(0.1, 10.0);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        self.filters.set_coeffs(BiquadCoeffs::peaking(
            sample_rate_of(&self.spec),
            self.params.frequency,
            self.params.gain_db,
            self.params.q,
        ));
    }

    pub fn params(&self) -> PresenceEqParams {
        self.params
    }

    pub fn set_params(&mut self, params: PresenceEqParams) {
        self.params.frequency = params.frequency.clamp(1000.0, 8000.0);
        self.params.gain_db = params.gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        self.params.q = params.q.clamp(0.1, 10.0);
        self.update_coefficients();
    }
}

impl Effect for PresenceEq {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.filters.prepare(spec.channels);
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        for ch in 0..buffer.num_channels() {
            self.filters.process_channel(ch, buffer.channel_mut(ch));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.filters.reset();
    }

    fn name(&self) -> &str {
        "Presence EQ"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "frequency" => Some(self.params.frequency),
            "gain" => Some(self.params.gain_db),
            "q" => Some(self.params.q),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "frequency" => self.set_frequency(value),
            "gain" => self.set_gain(value),
            "q" => self.set_q(value),
            _ => return false,
        }
        true
    }
}

/// Presence EQ parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceEqParams {
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
}

impl Default for PresenceEqParams {
    fn default() -> Self {
        Self {
            frequency: 4000.0,
            gain_db: 3.0,
            q: 1.0,
        }
    }
}
