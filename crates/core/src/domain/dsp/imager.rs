//! Mid/side stereo imaging

use super::filter::Crossover;
use super::{db_to_gain, params, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Mid/side width control
///
/// `mid = (L + R) / 2`, `side = (L - R) / 2 * width`, then
/// `L' = mid + side`, `R' = mid - side`. Width 0 folds to mono, 1 is
/// unity and 2 doubles the side signal.
///
/// With bass mono enabled, the side signal below `mono_frequency` is
/// removed with a Linkwitz-Riley low-pass before scaling, so low end stays
/// centred regardless of width.
#[derive(Debug, Clone)]
pub struct StereoImager {
    params: StereoImagerParams,
    spec: Option<ProcessSpec>,
    output_gain: f32,
    side_lowpass: Crossover,
    name: &'static str,
}

impl Default for StereoImager {
    fn default() -> Self {
        Self::new(StereoImagerParams::default())
    }
}

impl StereoImager {
    pub fn new(params: StereoImagerParams) -> Self {
        let mut imager = Self {
            params,
            spec: None,
            output_gain: 1.0,
            side_lowpass: Crossover::lowpass(params.mono_frequency),
            name: "Stereo Imager",
        };
        imager.set_params(params);
        imager
    }

    /// Default imager under the name the effects suite shows
    pub fn widener() -> Self {
        let mut imager = Self::default();
        imager.name = "Stereo Widener";
        imager
    }

    pub fn set_width(&mut self, width: f32) {
        self.params.width = width.clamp(0.0, 2.0);
    }

    pub fn width(&self) -> f32 {
        self.params.width
    }

    pub fn set_mono_frequency(&mut self, hz: f32) {
        self.params.mono_frequency = hz.clamp(50.0, 500.0);
        self.side_lowpass.set_cutoff(self.params.mono_frequency);
    }

    pub fn set_bass_mono(&mut self, enabled: bool) {
        self.params.bass_mono = enabled;
    }

    pub fn set_output(&mut self, output_db: f32) {
        self.params.output_db = output_db.clamp(params::OUTPUT_DB_MIN, params::OUTPUT_DB_MAX);
        self.output_gain = db_to_gain(self.params.output_db);
    }

    pub fn params(&self) -> StereoImagerParams {
        self.params
    }

    pub fn set_params(&mut self, params: StereoImagerParams) {
        self.set_width(params.width);
        self.set_mono_frequency(params.mono_frequency);
        self.set_bass_mono(params.bass_mono);
        self.set_output(params.output_db);
        trace!(
            "Imager updated: width {:.2}, bass mono {} below {:.0}Hz",
            self.params.width,
            self.params.bass_mono,
            self.params.mono_frequency
        );
    }

    /// True when processing would reproduce the input exactly
    fn is_identity(&self) -> bool {
        self.params.width == 1.0 && self.output_gain == 1.0 && !self.params.bass_mono
    }
}

impl Effect for StereoImager {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.side_lowpass.prepare(spec.sample_rate_f32(), 1);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        if self.is_identity() {
            return Ok(());
        }
        let width = self.params.width;
        let gain = self.output_gain;
        let bass_mono = self.params.bass_mono;

        let Some((left, right)) = buffer.stereo_mut() else {
            return Ok(());
        };
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mid = (*l + *r) * 0.5;
            let mut side = (*l - *r) * 0.5;
            if bass_mono {
                side -= self.side_lowpass.process_sample(0, side);
            }
            side *= width;
            *l = (mid + side) * gain;
            *r = (mid - side) * gain;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.side_lowpass.reset();
    }

    fn name(&self) -> &str {
        self.name
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "width" => Some(self.params.width),
            "mono_frequency" => Some(self.params.mono_frequency),
            "bass_mono" => Some(if self.params.bass_mono { 1.0 } else { 0.0 }),
            "output" => Some(self.params.output_db),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "width" => self.set_width(value),
            "mono_frequency" => self.set_mono_frequency(value),
            "bass_mono" => self.set_bass_mono(value >= 0.5),
            "output" => self.set_output(value),
            _ => return false,
        }
        true
    }
}

/// Stereo imager parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoImagerParams {
    pub width: f32,
    pub mono_frequency: f32,
    pub bass_mono: bool,
    pub output_db: f32,
}

impl Default for StereoImagerParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            mono_frequency: 200.0,
            bass_mono: false,
            output_db: 0.0,
        }
    }
}
