//! Sidechain de-esser

use super::filter::{BiquadCoeffs, ChannelFilters};
use super::{db_to_gain, gain_to_db, params, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Feed-forward de-esser
///
/// A high-passed copy of the input acts purely as a detector. When its
/// mean absolute level across channels exceeds the threshold, the
/// original signal is attenuated on that same sample.
#[derive(Debug, Clone)]
pub struct DeEsser {
    params: DeEsserParams,
    spec: Option<ProcessSpec>,
    threshold: f32,
    detector: ChannelFilters,
    last_reduction_db: f32,
}

impl Default for DeEsser {
    fn default() -> Self {
        Self::new(DeEsserParams::default())
    }
}

impl DeEsser {
    pub fn new(params: DeEsserParams) -> Self {
        let mut deesser = Self {
            params,
            spec: None,
            threshold: 0.0,
            detector: ChannelFilters::default(),
            last_reduction_db: 0.0,
        };
        deesser.set_params(params);
        deesser
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.params.frequency = hz.clamp(2000.0, 10000.0);
        self.update_detector();
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.params.threshold_db = threshold_db.clamp(params::DB_MIN, 0.0);
        self.threshold = db_to_gain(self.params.threshold_db);
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.params.ratio = ratio.clamp(params::RATIO_MIN, params::RATIO_MAX);
    }

    fn update_detector(&mut self) {
        let sr = self.spec.unwrap_or_default().sample_rate_f32();
        self.detector.set_coeffs(BiquadCoeffs::highpass(
            sr,
            self.params.frequency,
            params::BUTTERWORTH_Q,
        ));
    }

    pub fn params(&self) -> DeEsserParams {
        self.params
    }

    pub fn set_params(&mut self, params: DeEsserParams) {
        self.set_frequency(params.frequency);
        self.set_threshold(params.threshold_db);
        self.set_ratio(params.ratio);
        trace!(
            "De-esser updated: {:.0}Hz, threshold {:.1}dB, ratio {:.1}:1",
            self.params.frequency,
            self.params.threshold_db,
            self.params.ratio
        );
    }

    /// Deepest reduction applied during the last block, in dB (<= 0)
    pub fn gain_reduction_db(&self) -> f32 {
        self.last_reduction_db
    }

    /// Gain for a detected sibilance level
    #[inline]
    fn gain_for(&self, level: f32) -> f32 {
        if level <= self.threshold {
            return 1.0;
        }
        1.0 / (level / self.threshold).powf(1.0 - 1.0 / self.params.ratio)
    }
}

impl Effect for DeEsser {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.detector.prepare(spec.channels);
        self.update_detector();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let channels = buffer.num_channels();
        if channels == 0 {
            return Ok(());
        }

        let mut min_gain = 1.0_f32;
        for i in 0..buffer.num_samples() {
            let mut level = 0.0;
            for ch in 0..channels {
                level += self.detector.process_sample(ch, buffer.channel(ch)[i]).abs();
            }
            let gain = self.gain_for(level / channels as f32);
            if gain < 1.0 {
                for ch in 0..channels {
                    buffer.channel_mut(ch)[i] *= gain;
                }
                min_gain = min_gain.min(gain);
            }
        }

        self.last_reduction_db = gain_to_db(min_gain);
        Ok(())
    }

    fn reset(&mut self) {
        self.detector.reset();
        self.last_reduction_db = 0.0;
    }

    fn name(&self) -> &str {
        "De-Esser"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "frequency" => Some(self.params.frequency),
            "threshold" => Some(self.params.threshold_db),
            "ratio" => Some(self.params.ratio),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "frequency" => self.set_frequency(value),
            "threshold" => self.set_threshold(value),
            "ratio" => self.set_ratio(value),
            _ => return false,
        }
        true
    }
}

/// De-esser parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeEsserParams {
    pub frequency: f32,
    pub threshold_db: f32,
    pub ratio: f32,
}

impl Default for DeEsserParams {
    fn default() -> Self {
        Self {
            frequency: 6000.0,
            threshold_db: -20.0,
            ratio: 4.0,
        }
    }
}
