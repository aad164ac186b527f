//! Soft-clipping saturation with a tone shelf

use super::filter::{BiquadCoeffs, ChannelFilters};
use super::{db_to_gain, params, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};

/// Drive scaling: drive 1.0 pushes the waveshaper with 11x gain
const DRIVE_SCALING: f32 = 10.0;

/// tanh waveshaper followed by an optional high-shelf tone control
///
/// Tone 0 darkens (shelf cut), 0.5 is near neutral, 1 brightens.
#[derive(Debug, Clone)]
pub struct Saturator {
    params: SaturatorParams,
    spec: Option<ProcessSpec>,
    tone_enabled: bool,
    output_gain: f32,
    tone_filter: ChannelFilters,
    name: &'static str,
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new(SaturatorParams::default())
    }
}

impl Saturator {
    pub fn new(params: SaturatorParams) -> Self {
        let mut saturator = Self {
            params,
            spec: None,
            tone_enabled: true,
            output_gain: 1.0,
            tone_filter: ChannelFilters::default(),
            name: "Saturation",
        };
        saturator.set_params(params);
        saturator
    }

    /// Light saturation without tone shaping, for mastering warmth
    pub fn warm() -> Self {
        let mut saturator = Self::new(SaturatorParams {
            drive: 0.2,
            ..Default::default()
        });
        saturator.tone_enabled = false;
        saturator.name = "Warm Saturation";
        saturator
    }

    pub fn set_drive(&mut self, drive: f32) {
        self.params.drive = drive.clamp(0.0, 1.0);
    }

    pub fn set_tone(&mut self, tone: f32) {
        self.params.tone = tone.clamp(0.0, 1.0);
        self.update_tone_filter();
    }

    pub fn set_output(&mut self, output_db: f32) {
        self.params.output_db = output_db.clamp(params::OUTPUT_DB_MIN, params::OUTPUT_DB_MAX);
        self.output_gain = db_to_gain(self.params.output_db);
    }

    fn update_tone_filter(&mut self) {
        let sr = self.spec.unwrap_or_default().sample_rate_f32();
        let freq = 1000.0 + self.params.tone * 4000.0;
        let gain = 0.5 + self.params.tone;
        self.tone_filter
            .set_coeffs(BiquadCoeffs::high_shelf_linear(sr, freq, gain, 0.7));
    }

    pub fn params(&self) -> SaturatorParams {
        self.params
    }

    pub fn set_params(&mut self, params: SaturatorParams) {
        self.set_drive(params.drive);
        self.set_tone(params.tone);
        self.set_output(params.output_db);
    }

    /// Waveshape one sample
    #[inline]
    pub fn saturate(&self, sample: f32) -> f32 {
        (sample * (1.0 + self.params.drive * DRIVE_SCALING)).tanh() * self.output_gain
    }
}

impl Effect for Saturator {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.tone_filter.prepare(spec.channels);
        self.update_tone_filter();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        for ch in 0..buffer.num_channels() {
            let samples = buffer.channel_mut(ch);
            for sample in samples.iter_mut() {
                *sample = self.saturate(*sample);
            }
            if self.tone_enabled {
                self.tone_filter.process_channel(ch, samples);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.tone_filter.reset();
    }

    fn name(&self) -> &str {
        self.name
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "drive" => Some(self.params.drive),
            "tone" => Some(self.params.tone),
            "output" => Some(self.params.output_db),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "drive" => self.set_drive(value),
            "tone" => self.set_tone(value),
            "output" => self.set_output(value),
            _ => return false,
        }
        true
    }
}

/// Saturation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaturatorParams {
    pub drive: f32,
    pub tone: f32,
    pub output_db: f32,
}

impl Default for SaturatorParams {
    fn default() -> Self {
        Self {
            drive: 0.5,
            tone: 0.5,
            output_db: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_util::*;

    #[test]
    fn test_saturation_bounded() {
        let mut sat = Saturator::warm();
        sat.prepare(&spec());

        let mut buffer = stereo_sine(BLOCK, 100.0, 4.0);
        sat.process(&mut buffer).unwrap();
        assert!(buffer.peak() <= 1.0);
    }

    #[test]
    fn test_saturation_curve() {
        let sat = Saturator::warm();
        // drive 0.2 gives 3x pre-gain
        assert!((sat.saturate(0.1) - (0.3_f32).tanh()).abs() < 1e-6);
        assert_eq!(sat.saturate(0.0), 0.0);
    }

    #[test]
    fn test_saturation_output_gain() {
        let mut sat = Saturator::warm();
        sat.set_output(-6.0);
        let quiet = sat.saturate(0.5);
        sat.set_output(0.0);
        let loud = sat.saturate(0.5);
        assert!((quiet / loud - 0.501).abs() < 0.01);
    }

    #[test]
    fn test_saturation_clamps() {
        let mut sat = Saturator::default();
        sat.set_drive(5.0);
        sat.set_output(40.0);
        assert_eq!(sat.params().drive, 1.0);
        assert_eq!(sat.params().output_db, 12.0);
        assert_eq!(sat.name(), "Saturation");
        assert_eq!(Saturator::warm().name(), "Warm Saturation");
    }

    #[test]
    fn test_saturation_reset() {
        let mut sat = Saturator::default();
        sat.prepare(&spec());
        assert_reset_clears(&mut sat);
    }
}
