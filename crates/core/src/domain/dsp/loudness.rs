//! Windowed RMS loudness normalizer

use super::{db_to_gain, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Level reported before the first window completes
const INITIAL_LEVEL_DB: f32 = -24.0;
/// Largest correction toward the target, either direction
const MAX_CORRECTION_DB: f32 = 12.0;
/// One-pole smoothing of the applied gain per window
const GAIN_SMOOTHING: f32 = 0.9;
const WINDOW_SECONDS: f64 = 1.0;

/// Drives the output toward a target level
///
/// Sum of squares over every channel is accumulated for one second of
/// frames. At each window boundary the RMS level sets a new target gain
/// (clamped to +/-12 dB), and the applied gain moves 10% of the way there.
/// The current gain is applied to every sample.
#[derive(Debug, Clone)]
pub struct LoudnessNormalizer {
    params: LoudnessNormalizerParams,
    spec: Option<ProcessSpec>,
    window_frames: usize,
    frames: usize,
    samples: usize,
    sum_squares: f64,
    level_db: f32,
    target_gain: f32,
    gain: f32,
}

impl Default for LoudnessNormalizer {
    fn default() -> Self {
        Self::new(LoudnessNormalizerParams::default())
    }
}

impl LoudnessNormalizer {
    pub fn new(params: LoudnessNormalizerParams) -> Self {
        let mut normalizer = Self {
            params,
            spec: None,
            window_frames: 0,
            frames: 0,
            samples: 0,
            sum_squares: 0.0,
            level_db: INITIAL_LEVEL_DB,
            target_gain: 1.0,
            gain: 1.0,
        };
        normalizer.set_params(params);
        normalizer
    }

    pub fn set_target(&mut self, target_db: f32) {
        self.params.target_db = target_db.clamp(-24.0, -6.0);
    }

    pub fn target(&self) -> f32 {
        self.params.target_db
    }

    pub fn params(&self) -> LoudnessNormalizerParams {
        self.params
    }

    pub fn set_params(&mut self, params: LoudnessNormalizerParams) {
        self.set_target(params.target_db);
        trace!("Normalizer target {:.1}dB", self.params.target_db);
    }

    /// Level measured at the last window boundary, in dB
    pub fn measured_level_db(&self) -> f32 {
        self.level_db
    }

    /// Linear gain currently being applied
    pub fn current_gain(&self) -> f32 {
        self.gain
    }

    /// Linear gain the smoother is moving toward
    pub fn target_gain(&self) -> f32 {
        self.target_gain
    }

    /// Length of one measurement window in frames
    pub fn window_frames(&self) -> usize {
        self.window_frames
    }

    fn close_window(&mut self) {
        let rms = (self.sum_squares / self.samples.max(1) as f64).sqrt() as f32;
        self.level_db = 20.0 * (rms + 1e-7).log10();
        let correction_db =
            (self.params.target_db - self.level_db).clamp(-MAX_CORRECTION_DB, MAX_CORRECTION_DB);
        self.target_gain = db_to_gain(correction_db);
        self.gain = self.gain * GAIN_SMOOTHING + self.target_gain * (1.0 - GAIN_SMOOTHING);
        debug!(
            "Loudness window: {:.1}dB measured, gain {:.3} -> {:.3}",
            self.level_db, self.gain, self.target_gain
        );

        self.frames = 0;
        self.samples = 0;
        self.sum_squares = 0.0;
    }
}

impl Effect for LoudnessNormalizer {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.window_frames = ((spec.sample_rate * WINDOW_SECONDS) as usize).max(1);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let channels = buffer.num_channels();
        if channels == 0 {
            return Ok(());
        }

        for i in 0..buffer.num_samples() {
            for ch in 0..channels {
                let sample = &mut buffer.channel_mut(ch)[i];
                self.sum_squares += (*sample as f64) * (*sample as f64);
                *sample *= self.gain;
            }
            self.samples += channels;
            self.frames += 1;
            if self.frames >= self.window_frames {
                self.close_window();
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.frames = 0;
        self.samples = 0;
        self.sum_squares = 0.0;
        self.level_db = INITIAL_LEVEL_DB;
        self.target_gain = 1.0;
        self.gain = 1.0;
    }

    fn name(&self) -> &str {
        "Loudness Normalizer"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "target" => Some(self.params.target_db),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "target" => self.set_target(value),
            _ => return false,
        }
        true
    }
}

/// Loudness normalizer parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessNormalizerParams {
    /// Target level in dB (approximate LUFS)
    pub target_db: f32,
}

impl Default for LoudnessNormalizerParams {
    fn default() -> Self {
        Self { target_db: -14.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::gain_to_db;
    use crate::domain::dsp::test_util::*;

    fn run_windows(normalizer: &mut LoudnessNormalizer, amplitude: f32, windows: usize) -> Vec<f32> {
        let mut gains = Vec::new();
        // 1.5 kHz has a 32-sample period, so every window holds whole cycles
        let block = stereo_sine(BLOCK, 1500.0, amplitude);
        let mut scratch = block.clone();
        let mut processed = 0;
        while gains.len() < windows {
            scratch.copy_from(&block).unwrap();
            normalizer.process(&mut scratch).unwrap();
            processed += BLOCK;
            if processed >= normalizer.window_frames() {
                processed -= normalizer.window_frames();
                gains.push(normalizer.current_gain());
            }
        }
        gains
    }

    #[test]
    fn test_normalizer_defaults() {
        let normalizer = LoudnessNormalizer::default();
        assert_eq!(normalizer.target(), -14.0);
        assert_eq!(normalizer.current_gain(), 1.0);
        assert_eq!(normalizer.measured_level_db(), -24.0);
    }

    #[test]
    fn test_normalizer_first_window_is_unity() {
        let mut normalizer = LoudnessNormalizer::default();
        normalizer.prepare(&spec());

        let input = stereo_sine(BLOCK, 1500.0, 0.1);
        let mut output = input.clone();
        normalizer.process(&mut output).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_normalizer_converges_monotonically() {
        let mut normalizer = LoudnessNormalizer::default();
        normalizer.prepare(&spec());

        // 0.1 peak sine is about -23 dB RMS, 9 dB under target
        let gains = run_windows(&mut normalizer, 0.1, 60);
        let expected = normalizer.target_gain();
        assert!((gain_to_db(expected) - 9.03).abs() < 0.5);

        for pair in gains.windows(2) {
            assert!(pair[1] >= pair[0]);
            assert!(pair[1] <= expected + 1e-4);
        }
        let last = gains[gains.len() - 1];
        assert!((gain_to_db(last) - gain_to_db(expected)).abs() < 0.5);
    }

    #[test]
    fn test_normalizer_correction_is_clamped() {
        let mut normalizer = LoudnessNormalizer::default();
        normalizer.prepare(&spec());

        // -60 dB input would need +46 dB
        let gains = run_windows(&mut normalizer, 0.001, 3);
        assert!((gain_to_db(normalizer.target_gain()) - 12.0).abs() < 1e-3);
        assert!(gains.iter().all(|&g| g <= db_to_gain(12.0)));
    }

    #[test]
    fn test_normalizer_target_clamp() {
        let mut normalizer = LoudnessNormalizer::default();
        assert!(normalizer.set_parameter("target", 0.0));
        assert_eq!(normalizer.target(), -6.0);
        normalizer.set_target(-40.0);
        assert_eq!(normalizer.target(), -24.0);
    }

    #[test]
    fn test_normalizer_reset() {
        let mut normalizer = LoudnessNormalizer::default();
        normalizer.prepare(&spec());
        run_windows(&mut normalizer, 0.1, 2);
        normalizer.reset();
        normalizer.reset();
        assert_eq!(normalizer.current_gain(), 1.0);
        assert_eq!(normalizer.measured_level_db(), -24.0);
        assert_reset_clears(&mut normalizer);
    }
}
