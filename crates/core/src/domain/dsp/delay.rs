//! Sample-accurate delay line and the tempo-synced echo built on it

use super::{prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// DELAY LINE
// ============================================================================

/// Multichannel circular delay line
///
/// Storage is sized in [`DelayLine::prepare`] and only ever grows. Reads are
/// taken before the current sample is written, so a delay of `N` samples
/// yields exactly `N` samples of the previous history (silence after a reset)
/// before the input reappears.
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffers: Vec<Vec<f32>>,
    write_pos: Vec<usize>,
    delay: usize,
    max_delay: usize,
}

impl DelayLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate room for `max_delay` samples on each of `channels` channels
    pub fn prepare(&mut self, channels: usize, max_delay: usize) {
        let len = max_delay.max(self.max_delay).max(1) + 1;
        if self.buffers.len() < channels {
            self.buffers.resize_with(channels, Vec::new);
            self.write_pos.resize(channels, 0);
        }
        for buffer in &mut self.buffers {
            if buffer.len() < len {
                buffer.resize(len, 0.0);
            }
        }
        self.max_delay = len - 1;
        self.delay = self.delay.min(self.max_delay);
    }

    /// Set the delay in whole samples, clamped to the prepared maximum
    pub fn set_delay(&mut self, samples: usize) {
        self.delay = samples.min(self.max_delay);
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn max_delay(&self) -> usize {
        self.max_delay
    }

    pub fn num_channels(&self) -> usize {
        self.buffers.len()
    }

    /// Read the sample pushed `delay` pushes ago (`1..=max_delay`)
    #[inline]
    pub fn read(&self, ch: usize, delay: usize) -> f32 {
        let buffer = &self.buffers[ch];
        let len = buffer.len();
        let delay = delay.clamp(1, len - 1);
        buffer[(self.write_pos[ch] + len - delay) % len]
    }

    /// Linearly interpolated read at a fractional delay
    #[inline]
    pub fn read_fractional(&self, ch: usize, delay: f32) -> f32 {
        let delay = delay.clamp(1.0, (self.max_delay.max(2) - 1) as f32);
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;
        let a = self.read(ch, whole);
        let b = self.read(ch, whole + 1);
        a + (b - a) * frac
    }

    /// Write the next sample
    #[inline]
    pub fn push(&mut self, ch: usize, sample: f32) {
        let buffer = &mut self.buffers[ch];
        let pos = self.write_pos[ch];
        buffer[pos] = sample;
        self.write_pos[ch] = (pos + 1) % buffer.len();
    }

    /// Pop the delayed sample, then push `sample`
    #[inline]
    pub fn process_sample(&mut self, ch: usize, sample: f32) -> f32 {
        if self.delay == 0 {
            return sample;
        }
        let delayed = self.read(ch, self.delay);
        self.push(ch, sample);
        delayed
    }

    /// Delay a whole channel slice in place
    pub fn process_channel(&mut self, ch: usize, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(ch, *sample);
        }
    }

    /// Clear history without releasing storage
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos.fill(0);
    }
}

// ============================================================================
// SUBTLE DELAY
// ============================================================================

/// Feedback echo blended under the dry signal
#[derive(Debug, Clone)]
pub struct SubtleDelay {
    params: SubtleDelayParams,
    spec: Option<ProcessSpec>,
    line: DelayLine,
}

impl Default for SubtleDelay {
    fn default() -> Self {
        Self::new(SubtleDelayParams::default())
    }
}

impl SubtleDelay {
    const MAX_DELAY_MS: f32 = 2000.0;

    pub fn new(params: SubtleDelayParams) -> Self {
        let mut delay = Self {
            params,
            spec: None,
            line: DelayLine::new(),
        };
        delay.set_params(params);
        delay
    }

    pub fn set_delay_time(&mut self, ms: f32) {
        self.params.delay_ms = ms.clamp(1.0, Self::MAX_DELAY_MS);
        if let Some(spec) = self.spec {
            self.line.set_delay(spec.ms_to_samples(self.params.delay_ms));
        }
    }

    /// Lock the echo to one quarter note at `bpm`
    pub fn sync_to_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 {
            let quarter_ms = (60000.0 / bpm) as f32;
            trace!("Delay synced to {:.1} BPM ({:.1}ms)", bpm, quarter_ms);
            self.set_delay_time(quarter_ms);
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.params.feedback = feedback.clamp(0.0, 0.9);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.params.mix = mix.clamp(0.0, 1.0);
    }

    pub fn params(&self) -> SubtleDelayParams {
        self.params
    }

    pub fn set_params(&mut self, params: SubtleDelayParams) {
        self.set_delay_time(params.delay_ms);
        self.set_feedback(params.feedback);
        self.set_mix(params.mix);
    }
}

impl Effect for SubtleDelay {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.line
            .prepare(spec.channels, spec.ms_to_samples(Self::MAX_DELAY_MS));
        self.set_delay_time(self.params.delay_ms);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let SubtleDelayParams { feedback, mix, .. } = self.params;
        let delay = self.line.delay();

        for ch in 0..buffer.num_channels() {
            for sample in buffer.channel_mut(ch).iter_mut() {
                let input = *sample;
                let delayed = self.line.read(ch, delay);
                self.line.push(ch, input + delayed * feedback);
                *sample = input * (1.0 - mix) + delayed * mix;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.line.reset();
    }

    fn name(&self) -> &str {
        "Subtle Delay"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "time" => Some(self.params.delay_ms),
            "feedback" => Some(self.params.feedback),
            "mix" => Some(self.params.mix),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "time" => self.set_delay_time(value),
            "feedback" => self.set_feedback(value),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

/// Subtle delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubtleDelayParams {
    pub delay_ms: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for SubtleDelayParams {
    fn default() -> Self {
        Self {
            delay_ms: 300.0,
            feedback: 0.3,
            mix: 0.2,
        }
    }
}
