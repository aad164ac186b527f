//! Vocal timbre shaping and harmony settings for the vocal clone

use super::filter::{BiquadCoeffs, ChannelFilters};
use super::{gain_to_db, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::trace;

/// Number of harmony voices
pub const HARMONY_VOICES: usize = 4;

/// Drift LFO advance per sample, in radians
const DRIFT_RATE: f32 = 0.001;
/// Depth of the amplitude drift at full drift amount
const DRIFT_DEPTH: f32 = 0.01;
const FORMANT_BASE_HZ: f32 = 1000.0;
const FORMANT_Q: f32 = 2.0;
const FORMANT_GAIN: f32 = 1.2;
const BRIGHTNESS_Q: f32 = 0.7;

/// Interval presets for the first two harmony voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HarmonyMode {
    Thirds,
    Fifths,
    Sixths,
    /// Keep whatever intervals are currently set
    #[default]
    Custom,
}

impl HarmonyMode {
    /// Semitone offsets for voices 0 and 1, `None` for custom
    pub fn intervals(self) -> Option<[f32; 2]> {
        match self {
            HarmonyMode::Thirds => Some([4.0, -3.0]),
            HarmonyMode::Fifths => Some([7.0, -5.0]),
            HarmonyMode::Sixths => Some([9.0, -4.0]),
            HarmonyMode::Custom => None,
        }
    }
}

/// Pitch, timbre and harmony settings of the vocal clone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VocalTimbreParams {
    /// Semitones, -12..12
    pub pitch_correction: f32,
    /// Milliseconds, 10..100
    pub correction_speed_ms: f32,
    pub pitch_drift: f32,
    pub spectral_shaping: f32,
    /// Semitones, -12..12
    pub formant_shift: f32,
    pub brightness: f32,
    pub humanize: f32,
    pub harmony_enabled: bool,
    pub harmony_mode: HarmonyMode,
    pub harmony_voices: [f32; HARMONY_VOICES],
    pub harmony_levels: [f32; HARMONY_VOICES],
}

impl Default for VocalTimbreParams {
    fn default() -> Self {
        Self {
            pitch_correction: 0.0,
            correction_speed_ms: 50.0,
            pitch_drift: 0.1,
            spectral_shaping: 0.5,
            formant_shift: 0.0,
            brightness: 0.5,
            humanize: 0.3,
            harmony_enabled: false,
            harmony_mode: HarmonyMode::Custom,
            harmony_voices: [0.0; HARMONY_VOICES],
            harmony_levels: [0.5; HARMONY_VOICES],
        }
    }
}

/// DSP half of the vocal clone
///
/// Applies a brightness shelf, a formant peak and a slow amplitude drift.
/// Pitch correction and harmony voices are carried as settings for the
/// inference role that renders them.
#[derive(Debug, Clone)]
pub struct VocalTimbre {
    params: VocalTimbreParams,
    spec: Option<ProcessSpec>,
    brightness_filter: ChannelFilters,
    formant_filter: ChannelFilters,
    drift_phase: f32,
}

impl Default for VocalTimbre {
    fn default() -> Self {
        Self::new(VocalTimbreParams::default())
    }
}

impl VocalTimbre {
    pub fn new(params: VocalTimbreParams) -> Self {
        let mut timbre = Self {
            params,
            spec: None,
            brightness_filter: ChannelFilters::default(),
            formant_filter: ChannelFilters::default(),
            drift_phase: 0.0,
        };
        timbre.set_params(params);
        timbre
    }

    // ========================================================================
    // Pitch
    // ========================================================================

    pub fn set_pitch_correction(&mut self, semitones: f32) {
        self.params.pitch_correction = semitones.clamp(-12.0, 12.0);
    }

    pub fn set_correction_speed(&mut self, ms: f32) {
        self.params.correction_speed_ms = ms.clamp(10.0, 100.0);
    }

    pub fn set_pitch_drift(&mut self, amount: f32) {
        self.params.pitch_drift = amount.clamp(0.0, 1.0);
    }

    // ========================================================================
    // Timbre
    // ========================================================================

    pub fn set_spectral_shaping(&mut self, amount: f32) {
        self.params.spectral_shaping = amount.clamp(0.0, 1.0);
    }

    pub fn set_formant_shift(&mut self, semitones: f32) {
        self.params.formant_shift = semitones.clamp(-12.0, 12.0);
        self.update_formant_filter();
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.params.brightness = brightness.clamp(0.0, 1.0);
        self.update_brightness_filter();
    }

    pub fn set_humanize(&mut self, amount: f32) {
        self.params.humanize = amount.clamp(0.0, 1.0);
    }

    // ========================================================================
    // Harmony
    // ========================================================================

    pub fn set_harmony_enabled(&mut self, enabled: bool) {
        self.params.harmony_enabled = enabled;
    }

    /// Out-of-range voice indices are ignored
    pub fn set_harmony_voice(&mut self, voice: usize, semitones: f32) {
        if let Some(slot) = self.params.harmony_voices.get_mut(voice) {
            *slot = semitones.clamp(-24.0, 24.0);
        }
    }

    pub fn set_harmony_level(&mut self, voice: usize, level: f32) {
        if let Some(slot) = self.params.harmony_levels.get_mut(voice) {
            *slot = level.clamp(0.0, 1.0);
        }
    }

    pub fn set_harmony_mode(&mut self, mode: HarmonyMode) {
        self.params.harmony_mode = mode;
        if let Some([first, second]) = mode.intervals() {
            self.params.harmony_voices[0] = first;
            self.params.harmony_voices[1] = second;
        }
    }

    /// True when the pitch/harmony role has work to do
    pub fn needs_pitch_processing(&self) -> bool {
        self.params.harmony_enabled || self.params.pitch_correction != 0.0
    }

    pub fn params(&self) -> VocalTimbreParams {
        self.params
    }

    pub fn set_params(&mut self, params: VocalTimbreParams) {
        self.set_pitch_correction(params.pitch_correction);
        self.set_correction_speed(params.correction_speed_ms);
        self.set_pitch_drift(params.pitch_drift);
        self.set_spectral_shaping(params.spectral_shaping);
        self.set_formant_shift(params.formant_shift);
        self.set_brightness(params.brightness);
        self.set_humanize(params.humanize);
        self.set_harmony_enabled(params.harmony_enabled);
        for voice in 0..HARMONY_VOICES {
            self.set_harmony_voice(voice, params.harmony_voices[voice]);
            self.set_harmony_level(voice, params.harmony_levels[voice]);
        }
        self.set_harmony_mode(params.harmony_mode);
        trace!(
            "Vocal timbre updated: brightness {:.2}, formant {:+.1}st",
            self.params.brightness,
            self.params.formant_shift
        );
    }

    fn sample_rate(&self) -> f32 {
        self.spec.unwrap_or_default().sample_rate_f32()
    }

    fn update_brightness_filter(&mut self) {
        let b = self.params.brightness;
        let coeffs = BiquadCoeffs::high_shelf_linear(
            self.sample_rate(),
            2000.0 + b * 6000.0,
            0.7 + b * 0.6,
            BRIGHTNESS_Q,
        );
        self.brightness_filter.set_coeffs(coeffs);
    }

    fn update_formant_filter(&mut self) {
        let freq = (FORMANT_BASE_HZ * 2.0_f32.powf(self.params.formant_shift / 12.0))
            .clamp(200.0, 5000.0);
        let coeffs =
            BiquadCoeffs::peaking(self.sample_rate(), freq, gain_to_db(FORMANT_GAIN), FORMANT_Q);
        self.formant_filter.set_coeffs(coeffs);
    }

    /// Centre frequency of the formant peak
    pub fn formant_frequency(&self) -> f32 {
        (FORMANT_BASE_HZ * 2.0_f32.powf(self.params.formant_shift / 12.0)).clamp(200.0, 5000.0)
    }
}

impl Effect for VocalTimbre {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.brightness_filter.prepare(spec.channels);
        self.formant_filter.prepare(spec.channels);
        self.update_brightness_filter();
        self.update_formant_filter();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let depth = self.params.pitch_drift * DRIFT_DEPTH;
        let start_phase = self.drift_phase;

        for ch in 0..buffer.num_channels() {
            let samples = buffer.channel_mut(ch);
            self.brightness_filter.process_channel(ch, samples);
            self.formant_filter.process_channel(ch, samples);
            if depth > 0.0 {
                let mut phase = start_phase;
                for sample in samples.iter_mut() {
                    *sample *= 1.0 + phase.sin() * depth;
                    phase += DRIFT_RATE;
                }
            }
        }

        self.drift_phase = (start_phase + DRIFT_RATE * buffer.num_samples() as f32) % TAU;
        Ok(())
    }

    fn reset(&mut self) {
        self.brightness_filter.reset();
        self.formant_filter.reset();
        self.drift_phase = 0.0;
    }

    fn name(&self) -> &str {
        "Vocal Clone"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        let p = &self.params;
        match name {
            "pitch_correction" => Some(p.pitch_correction),
            "correction_speed" => Some(p.correction_speed_ms),
            "pitch_drift" => Some(p.pitch_drift),
            "spectral_shaping" => Some(p.spectral_shaping),
            "formant_shift" => Some(p.formant_shift),
            "brightness" => Some(p.brightness),
            "humanize" => Some(p.humanize),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "pitch_correction" => self.set_pitch_correction(value),
            "correction_speed" => self.set_correction_speed(value),
            "pitch_drift" => self.set_pitch_drift(value),
            "spectral_shaping" => self.set_spectral_shaping(value),
            "formant_shift" => self.set_formant_shift(value),
            "brightness" => self.set_brightness(value),
            "humanize" => self.set_humanize(value),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_util::*;

    #[test]
    fn test_vocal_defaults() {
        let timbre = VocalTimbre::default();
        let params = timbre.params();
        assert_eq!(params.correction_speed_ms, 50.0);
        assert_eq!(params.pitch_drift, 0.1);
        assert_eq!(params.harmony_levels, [0.5; HARMONY_VOICES]);
        assert!(!timbre.needs_pitch_processing());
    }

    #[test]
    fn test_harmony_modes() {
        let mut timbre = VocalTimbre::default();
        timbre.set_harmony_mode(HarmonyMode::Fifths);
        assert_eq!(&timbre.params().harmony_voices[..2], &[7.0, -5.0]);

        timbre.set_harmony_voice(0, 12.0);
        timbre.set_harmony_mode(HarmonyMode::Custom);
        assert_eq!(&timbre.params().harmony_voices[..2], &[12.0, -5.0]);

        timbre.set_harmony_mode(HarmonyMode::Sixths);
        assert_eq!(&timbre.params().harmony_voices[..2], &[9.0, -4.0]);
    }

    #[test]
    fn test_harmony_voice_bounds() {
        let mut timbre = VocalTimbre::default();
        timbre.set_harmony_voice(7, 5.0);
        timbre.set_harmony_voice(3, 40.0);
        timbre.set_harmony_level(2, -1.0);
        assert_eq!(timbre.params().harmony_voices, [0.0, 0.0, 0.0, 24.0]);
        assert_eq!(timbre.params().harmony_levels[2], 0.0);
    }

    #[test]
    fn test_formant_frequency() {
        let mut timbre = VocalTimbre::default();
        assert!((timbre.formant_frequency() - 1000.0).abs() < 1e-3);
        timbre.set_formant_shift(12.0);
        assert!((timbre.formant_frequency() - 2000.0).abs() < 1e-2);
        timbre.set_formant_shift(-12.0);
        assert!((timbre.formant_frequency() - 500.0).abs() < 1e-2);
    }

    #[test]
    fn test_vocal_boosts_formant_region() {
        let mut timbre = VocalTimbre::new(VocalTimbreParams {
            pitch_drift: 0.0,
            ..Default::default()
        });
        timbre.prepare(&spec());

        let input = stereo_sine(9600, 1000.0, 0.3);
        let output = process_blocks(&mut timbre, &input);
        let ratio = output.rms() / input.rms();
        // Peak of +1.6 dB at 1 kHz, neutral shelf
        assert!(ratio > 1.1 && ratio < 1.3, "ratio {}", ratio);
    }

    #[test]
    fn test_vocal_needs_pitch_processing() {
        let mut timbre = VocalTimbre::default();
        timbre.set_pitch_correction(2.0);
        assert!(timbre.needs_pitch_processing());
        timbre.set_pitch_correction(0.0);
        timbre.set_harmony_enabled(true);
        assert!(timbre.needs_pitch_processing());
    }

    #[test]
    fn test_vocal_reset() {
        let mut timbre = VocalTimbre::default();
        timbre.prepare(&spec());
        assert_reset_clears(&mut timbre);
    }
}
