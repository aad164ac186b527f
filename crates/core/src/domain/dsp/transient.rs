//! Envelope-following transient shaper

use super::{prepared_spec, time_coeff, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};

const ENVELOPE_ATTACK_MS: f32 = 1.0;
const ENVELOPE_RELEASE_MS: f32 = 50.0;
/// Attack gain per unit of envelope slope
const SLOPE_SCALING: f32 = 10.0;
const SUSTAIN_SCALING: f32 = 0.5;
const MIN_GAIN: f32 = 0.1;
const MAX_GAIN: f32 = 4.0;

/// Boosts or tames note onsets and sustains independently
///
/// A dual-rate follower tracks the mean absolute level of all channels.
/// A rising envelope marks the attack phase and is scaled by the slope;
/// everything else is sustain and gets a constant offset.
#[derive(Debug, Clone)]
pub struct TransientShaper {
    params: TransientShaperParams,
    spec: Option<ProcessSpec>,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    previous: f32,
}

impl Default for TransientShaper {
    fn default() -> Self {
        Self::new(TransientShaperParams::default())
    }
}

impl TransientShaper {
    pub fn new(params: TransientShaperParams) -> Self {
        let mut shaper = Self {
            params,
            spec: None,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            previous: 0.0,
        };
        shaper.set_params(params);
        shaper.update_coefficients();
        shaper
    }

    pub fn set_attack(&mut self, amount: f32) {
        self.params.attack = amount.clamp(-1.0, 1.0);
    }

    pub fn set_sustain(&mut self, amount: f32) {
        self.params.sustain = amount.clamp(-1.0, 1.0);
    }

    pub fn params(&self) -> TransientShaperParams {
        self.params
    }

    pub fn set_params(&mut self, params: TransientShaperParams) {
        self.set_attack(params.attack);
        self.set_sustain(params.sustain);
    }

    fn update_coefficients(&mut self) {
        let sr = self.spec.unwrap_or_default().sample_rate_f32();
        self.attack_coeff = time_coeff(ENVELOPE_ATTACK_MS, sr);
        self.release_coeff = time_coeff(ENVELOPE_RELEASE_MS, sr);
    }

    /// Advance the follower by one level and return the shaping gain
    #[inline]
    fn next_gain(&mut self, level: f32) -> f32 {
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        let slope = self.envelope - self.previous;
        self.previous = self.envelope;

        let gain = if slope > 0.0 {
            1.0 + self.params.attack * slope * SLOPE_SCALING
        } else {
            1.0 + self.params.sustain * SUSTAIN_SCALING
        };
        gain.clamp(MIN_GAIN, MAX_GAIN)
    }
}

impl Effect for TransientShaper {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let channels = buffer.num_channels();
        if channels == 0 {
            return Ok(());
        }

        for i in 0..buffer.num_samples() {
            let level = (0..channels)
                .map(|ch| buffer.channel(ch)[i].abs())
                .sum::<f32>()
                / channels as f32;
            let gain = self.next_gain(level);
            for ch in 0..channels {
                buffer.channel_mut(ch)[i] *= gain;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.previous = 0.0;
    }

    fn name(&self) -> &str {
        "Transient Shaper"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        match name {
            "attack" => Some(self.params.attack),
            "sustain" => Some(self.params.sustain),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "attack" => self.set_attack(value),
            "sustain" => self.set_sustain(value),
            _ => return false,
        }
        true
    }
}

/// Transient shaper parameters, both in -1..1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransientShaperParams {
    pub attack: f32,
    pub sustain: f32,
}
