//! Chorus-style modulation effect

use super::delay::DelayLine;
use super::{prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, TAU};

/// Chorus built on an LFO-swept fractional delay
///
/// Each channel reads the shared LFO with a quarter-cycle offset so the
/// stereo image widens as the delay sweeps.
#[derive(Debug, Clone)]
pub struct Modulation {
    params: ModulationParams,
    spec: Option<ProcessSpec>,
    line: DelayLine,
    phase: f32,
}

impl Default for Modulation {
    fn default() -> Self {
        Self::new(ModulationParams::default())
    }
}

impl Modulation {
    /// Centre of the swept delay
    pub const CENTRE_DELAY_MS: f32 = 7.0;
    /// Feedback from the delayed signal back into the line
    pub const FEEDBACK: f32 = -0.2;
    const MAX_DELAY_MS: f32 = 20.0;

    pub fn new(params: ModulationParams) -> Self {
        let mut modulation = Self {
            params,
            spec: None,
            line: DelayLine::new(),
            phase: 0.0,
        };
        modulation.set_params(params);
        modulation
    }

    pub fn set_rate(&mut self, hz: f32) {
        self.params.rate_hz = hz.clamp(0.1, 10.0);
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.params.depth = depth.clamp(0.0, 1.0);
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.params.mix = mix.clamp(0.0, 1.0);
    }

    pub fn params(&self) -> ModulationParams {
        self.params
    }

    pub fn set_params(&mut self, params: ModulationParams) {
        self.set_rate(params.rate_hz);
        self.set_depth(params.depth);
        self.set_mix(params.mix);
    }
}

impl Effect for Modulation {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.line
            .prepare(spec.channels, spec.ms_to_samples(Self::MAX_DELAY_MS));
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let spec = prepared_spec(&self.spec, buffer)?;
        let sr = spec.sample_rate_f32();
        let centre = Self::CENTRE_DELAY_MS * 0.001 * sr;
        // Sweep stays inside (0, 2 * centre)
        let sweep = centre * 0.9 * self.params.depth;
        let increment = TAU * self.params.rate_hz / sr;
        let mix = self.params.mix;
        let start_phase = self.phase;

        for ch in 0..buffer.num_channels() {
            let mut phase = start_phase + ch as f32 * FRAC_PI_2;
            for sample in buffer.channel_mut(ch).iter_mut() {
                let input = *sample;
                let delay = centre + sweep * phase.sin();
                let wet = self.line.read_fractional(ch, delay);
                self.line.push(ch, input + wet * Self::FEEDBACK);
                *sample = input * (1.0 - mix) + wet * mix;
                phase += increment;
            }
        }

        self.phase = (start_phase + increment * buffer.num_samples() as f32) % TAU;
        Ok(())
    }

    fn reset(&mut self) {
        self.line.reset();
        self.phase = 0.0;
    }

    fn name(&self) -> &str {
        "Modulation"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "rate" => Some(self.params.rate_hz),
            "depth" => Some(self.params.depth),
            "mix" => Some(self.params.mix),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "rate" => self.set_rate(value),
            "depth" => self.set_depth(value),
            "mix" => self.set_mix(value),
            _ => return false,
        }
        true
    }
}

/// Modulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulationParams {
    pub rate_hz: f32,
    pub depth: f32,
    pub mix: f32,
}

impl Default for ModulationParams {
    fn default() -> Self {
        Self {
            rate_hz: 0.5,
            depth: 0.3,
            mix: 0.3,
        }
    }
}
