//! Reverberation: the late-reverb engine and the stages built on it
//!
//! - [`LateReverb`]: Schroeder/Moorer network of 8 damped combs and
//!   4 allpasses per side (Freeverb tuning)
//! - [`Reverb`]: plain track reverb with wet/dry/width
//! - [`CinematicReverb`]: pre-delayed hall for the mastering chain
//! - [`SpaceReverb`]: pre-delay, early reflections, late tail, damping

use super::delay::DelayLine;
use super::filter::{BiquadCoeffs, ChannelFilters};
use super::{prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ============================================================================
// LATE REVERB ENGINE
// ============================================================================

const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const TUNING_RATE: f64 = 44100.0;
const INPUT_GAIN: f32 = 0.015;
const ALLPASS_FEEDBACK: f32 = 0.5;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const MAX_FEEDBACK: f32 = 0.98;

/// Output scaling that brings the network back to roughly unity loudness
pub const WET_SCALE: f32 = 3.0;

#[derive(Debug, Clone, Default)]
struct Comb {
    buffer: Vec<f32>,
    len: usize,
    idx: usize,
    last: f32,
    feedback: f32,
}

impl Comb {
    fn allocate(&mut self, capacity: usize) {
        if self.buffer.len() < capacity {
            self.buffer.resize(capacity, 0.0);
        }
    }

    fn set_len(&mut self, len: usize) {
        self.len = len.clamp(1, self.buffer.len().max(1));
        self.idx %= self.len;
    }

    #[inline]
    fn process(&mut self, input: f32, damp1: f32, damp2: f32) -> f32 {
        let output = self.buffer[self.idx];
        self.last = output * damp2 + self.last * damp1;
        self.buffer[self.idx] = input + self.last * self.feedback;
        self.idx += 1;
        if self.idx >= self.len {
            self.idx = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.last = 0.0;
        self.idx = 0;
    }
}

#[derive(Debug, Clone, Default)]
struct Allpass {
    buffer: Vec<f32>,
    idx: usize,
}

impl Allpass {
    fn allocate(&mut self, len: usize) {
        self.buffer.resize(len.max(1), 0.0);
        self.idx %= self.buffer.len();
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.idx];
        self.buffer[self.idx] = input + buffered * ALLPASS_FEEDBACK;
        self.idx += 1;
        if self.idx >= self.buffer.len() {
            self.idx = 0;
        }
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.idx = 0;
    }
}

/// Dense late-reverb network producing a raw stereo tail
///
/// Comb buffers are allocated at full size in `prepare`; the size scale
/// and decay time only move the active comb length and feedback.
#[derive(Debug, Clone)]
pub struct LateReverb {
    sample_rate: f64,
    combs: [[Comb; 8]; 2],
    allpasses: [[Allpass; 4]; 2],
    room_size: f32,
    damping: f32,
    size_scale: f32,
    decay_seconds: Option<f32>,
    damp1: f32,
    damp2: f32,
}

impl Default for LateReverb {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

impl LateReverb {
    pub fn new(room_size: f32, damping: f32) -> Self {
        let mut late = Self {
            sample_rate: TUNING_RATE,
            combs: Default::default(),
            allpasses: Default::default(),
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            size_scale: 1.0,
            decay_seconds: None,
            damp1: 0.0,
            damp2: 1.0,
        };
        late.update_damping();
        late.update_feedback();
        late
    }

    fn scaled(&self, tuning: usize) -> usize {
        ((tuning as f64 * self.sample_rate / TUNING_RATE).round() as usize).max(1)
    }

    /// Allocate comb and allpass storage for `sample_rate`
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for (side, spread) in [0, STEREO_SPREAD].into_iter().enumerate() {
            for (comb, tuning) in self.combs[side].iter_mut().zip(COMB_TUNING) {
                let capacity = ((tuning + spread) as f64 * sample_rate / TUNING_RATE).round();
                comb.allocate((capacity as usize).max(1));
            }
            for (allpass, tuning) in self.allpasses[side].iter_mut().zip(ALLPASS_TUNING) {
                let len = ((tuning + spread) as f64 * sample_rate / TUNING_RATE).round();
                allpass.allocate(len as usize);
            }
        }
        self.update_lengths();
        self.update_feedback();
    }

    fn update_lengths(&mut self) {
        for (side, spread) in [0, STEREO_SPREAD].into_iter().enumerate() {
            for i in 0..COMB_TUNING.len() {
                let full = self.scaled(COMB_TUNING[i] + spread);
                let len = (full as f32 * self.size_scale).round() as usize;
                self.combs[side][i].set_len(len);
            }
        }
    }

    fn update_damping(&mut self) {
        self.damp1 = self.damping * DAMP_SCALE;
        self.damp2 = 1.0 - self.damp1;
    }

    fn update_feedback(&mut self) {
        let sample_rate = self.sample_rate as f32;
        let room_feedback = self.room_size * ROOM_SCALE + ROOM_OFFSET;
        for comb in self.combs.iter_mut().flatten() {
            comb.feedback = match self.decay_seconds {
                // Per-comb gain for a 60 dB decay over the requested time
                Some(rt60) => {
                    let len_seconds = comb.len as f32 / sample_rate;
                    10.0_f32
                        .powf(-3.0 * len_seconds / rt60)
                        .clamp(0.0, MAX_FEEDBACK)
                }
                None => room_feedback,
            };
        }
    }

    pub fn set_room_size(&mut self, room_size: f32) {
        self.room_size = room_size.clamp(0.0, 1.0);
        self.update_feedback();
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = damping.clamp(0.0, 1.0);
        self.update_damping();
    }

    /// Shrink the comb network, 1.0 being the full Freeverb tuning
    pub fn set_size_scale(&mut self, scale: f32) {
        self.size_scale = scale.clamp(0.1, 1.0);
        self.update_lengths();
        self.update_feedback();
    }

    /// Derive comb feedback from an RT60 instead of the room size
    pub fn set_decay_time(&mut self, seconds: Option<f32>) {
        self.decay_seconds = seconds.map(|s| s.max(0.01));
        self.update_feedback();
    }

    pub fn room_size(&self) -> f32 {
        self.room_size
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    #[inline]
    fn run_side(&mut self, side: usize, input: f32) -> f32 {
        let (damp1, damp2) = (self.damp1, self.damp2);
        let mut out = 0.0;
        for comb in &mut self.combs[side] {
            out += comb.process(input, damp1, damp2);
        }
        for allpass in &mut self.allpasses[side] {
            out = allpass.process(out);
        }
        out
    }

    /// Feed one stereo frame, returning the raw left/right tail
    #[inline]
    pub fn process_stereo(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * INPUT_GAIN;
        (self.run_side(0, input), self.run_side(1, input))
    }

    /// Feed one mono sample through the left network
    #[inline]
    pub fn process_mono(&mut self, sample: f32) -> f32 {
        self.run_side(0, sample * INPUT_GAIN)
    }

    pub fn reset(&mut self) {
        for comb in self.combs.iter_mut().flatten() {
            comb.clear();
        }
        for allpass in self.allpasses.iter_mut().flatten() {
            allpass.clear();
        }
    }
}

/// Wet gains for one side and its cross-feed, from wet level and width
#[inline]
fn wet_gains(wet: f32, width: f32) -> (f32, f32) {
    let wet = wet * WET_SCALE;
    (0.5 * wet * (1.0 + width), 0.5 * wet * (1.0 - width))
}

// ============================================================================
// TRACK REVERB
// ============================================================================

/// Freeverb-style room for the per-track DSP chain
#[derive(Debug, Clone)]
pub struct Reverb {
    params: ReverbParams,
    spec: Option<ProcessSpec>,
    late: LateReverb,
    pre_delay: Option<DelayLine>,
    pre_delay_ms: f32,
    name: &'static str,
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new(ReverbParams::default())
    }
}

impl Reverb {
    pub fn new(params: ReverbParams) -> Self {
        let mut reverb = Self {
            params,
            spec: None,
            late: LateReverb::new(params.room_size, params.damping),
            pre_delay: None,
            pre_delay_ms: 0.0,
            name: "Reverb",
        };
        reverb.set_params(params);
        reverb
    }

    pub fn set_room_size(&mut self, size: f32) {
        self.params.room_size = size.clamp(0.0, 1.0);
        self.late.set_room_size(self.params.room_size);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.params.damping = damping.clamp(0.0, 1.0);
        self.late.set_damping(self.params.damping);
    }

    pub fn set_wet_level(&mut self, level: f32) {
        self.params.wet_level = level.clamp(0.0, 1.0);
    }

    pub fn set_dry_level(&mut self, level: f32) {
        self.params.dry_level = level.clamp(0.0, 1.0);
    }

    pub fn set_width(&mut self, width: f32) {
        self.params.width = width.clamp(0.0, 1.0);
    }

    pub fn params(&self) -> ReverbParams {
        self.params
    }

    pub fn set_params(&mut self, params: ReverbParams) {
        self.set_room_size(params.room_size);
        self.set_damping(params.damping);
        self.set_wet_level(params.wet_level);
        self.set_dry_level(params.dry_level);
        self.set_width(params.width);
    }

    #[inline]
    fn predelay(&mut self, ch: usize, sample: f32) -> f32 {
        match &mut self.pre_delay {
            Some(line) => line.process_sample(ch, sample),
            None => sample,
        }
    }

    fn reverb_parameter(&self, name: &str) -> Option<f32> {
        match name {
            "room_size" => Some(self.params.room_size),
            "damping" => Some(self.params.damping),
            "wet" => Some(self.params.wet_level),
            "dry" => Some(self.params.dry_level),
            "width" => Some(self.params.width),
            _ => None,
        }
    }

    fn set_reverb_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "room_size" => self.set_room_size(value),
            "damping" => self.set_damping(value),
            "wet" => self.set_wet_level(value),
            "dry" => self.set_dry_level(value),
            "width" => self.set_width(value),
            _ => return false,
        }
        true
    }
}

impl Effect for Reverb {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.late.prepare(spec.sample_rate);
        if let Some(line) = &mut self.pre_delay {
            line.prepare(spec.channels, spec.ms_to_samples(CinematicReverb::MAX_PRE_DELAY_MS));
            line.set_delay(spec.ms_to_samples(self.pre_delay_ms));
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let (wet1, wet2) = wet_gains(self.params.wet_level, self.params.width);
        let dry = self.params.dry_level;

        if let Some((left, right)) = buffer.stereo_mut() {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let in_l = self.predelay(0, *l);
                let in_r = self.predelay(1, *r);
                let (out_l, out_r) = self.late.process_stereo(in_l, in_r);
                *l = out_l * wet1 + out_r * wet2 + *l * dry;
                *r = out_r * wet1 + out_l * wet2 + *r * dry;
            }
        } else if buffer.num_channels() == 1 {
            for sample in buffer.channel_mut(0).iter_mut() {
                let input = self.predelay(0, *sample);
                *sample = self.late.process_mono(input) * wet1 + *sample * dry;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.late.reset();
        if let Some(line) = &mut self.pre_delay {
            line.reset();
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        self.reverb_parameter(name)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        self.set_reverb_parameter(name, value)
    }
}

/// Reverb parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub width: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.3,
            dry_level: 0.7,
            width: 1.0,
        }
    }
}

// ============================================================================
// CINEMATIC REVERB
// ============================================================================

/// Large hall with a pre-delay ahead of the tail
///
/// Only the reverb input is pre-delayed; the dry path stays aligned.
#[derive(Debug, Clone)]
pub struct CinematicReverb {
    inner: Reverb,
}

impl Default for CinematicReverb {
    fn default() -> Self {
        Self::new(CinematicReverbParams::default())
    }
}

impl CinematicReverb {
    pub const MAX_PRE_DELAY_MS: f32 = 200.0;

    pub fn new(params: CinematicReverbParams) -> Self {
        let mut inner = Reverb::new(params.reverb);
        inner.pre_delay = Some(DelayLine::new());
        inner.name = "Cinematic Reverb";
        let mut reverb = Self { inner };
        reverb.set_pre_delay(params.pre_delay_ms);
        reverb
    }

    pub fn set_pre_delay(&mut self, ms: f32) {
        self.inner.pre_delay_ms = ms.clamp(0.0, Self::MAX_PRE_DELAY_MS);
        if let (Some(spec), Some(line)) = (self.inner.spec, &mut self.inner.pre_delay) {
            line.set_delay(spec.ms_to_samples(self.inner.pre_delay_ms));
        }
    }

    pub fn set_room_size(&mut self, size: f32) {
        self.inner.set_room_size(size);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.inner.set_damping(damping);
    }

    pub fn set_width(&mut self, width: f32) {
        self.inner.set_width(width);
    }

    /// Crossfade control: wet = mix, dry = 1 - mix
    pub fn set_mix(&mut self, mix: f32) {
        let mix = mix.clamp(0.0, 1.0);
        self.inner.set_wet_level(mix);
        self.inner.set_dry_level(1.0 - mix);
    }

    pub fn params(&self) -> CinematicReverbParams {
        CinematicReverbParams {
            reverb: self.inner.params(),
            pre_delay_ms: self.inner.pre_delay_ms,
        }
    }

    pub fn set_params(&mut self, params: CinematicReverbParams) {
        self.inner.set_params(params.reverb);
        self.set_pre_delay(params.pre_delay_ms);
    }
}

impl Effect for CinematicReverb {
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
        match name {
            "pre_delay" => Some(self.inner.pre_delay_ms),
            "mix" => Some(self.inner.params.wet_level),
            _ => self.inner.reverb_parameter(name),
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "pre_delay" => self.set_pre_delay(value),
            "mix" => self.set_mix(value),
            _ => return self.inner.set_reverb_parameter(name, value),
        }
        true
    }
}

/// Cinematic reverb parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CinematicReverbParams {
    pub reverb: ReverbParams,
    pub pre_delay_ms: f32,
}

impl Default for CinematicReverbParams {
    fn default() -> Self {
        Self {
            reverb: ReverbParams {
                room_size: 0.8,
                damping: 0.4,
                wet_level: 0.25,
                dry_level: 0.75,
                width: 1.0,
            },
            pre_delay_ms: 30.0,
        }
    }
}

// ============================================================================
// SPACE REVERB
// ============================================================================

const EARLY_TAPS: usize = 8;
const EARLY_MIX: f32 = 0.3;
const EARLY_DECAY: f32 = 0.1;
const ROOM_SHAPE_OFFSET: f32 = 0.5;
const MAX_EARLY_MS: f32 = 100.0;

/// Reverb with explicit pre-delay, early reflections and damped tail
///
/// Signal flow per channel:
/// pre-delay -> early-reflection taps (summed back in) -> late reverb ->
/// damping low-pass -> tail gain -> linear crossfade with the dry input.
#[derive(Debug, Clone)]
pub struct SpaceReverb {
    params: SpaceReverbParams,
    spec: Option<ProcessSpec>,
    pre_delay: DelayLine,
    early: DelayLine,
    tap_delays: [usize; EARLY_TAPS],
    tap_gains: [f32; EARLY_TAPS],
    late: LateReverb,
    damping_filter: ChannelFilters,
}

impl Default for SpaceReverb {
    fn default() -> Self {
        Self::new(SpaceReverbParams::default())
    }
}

impl SpaceReverb {
    pub const MAX_PRE_DELAY_MS: f32 = 200.0;

    pub fn new(params: SpaceReverbParams) -> Self {
        let mut reverb = Self {
            params,
            spec: None,
            pre_delay: DelayLine::new(),
            early: DelayLine::new(),
            tap_delays: [1; EARLY_TAPS],
            tap_gains: [0.0; EARLY_TAPS],
            late: LateReverb::new(params.room_size, params.damping),
            damping_filter: ChannelFilters::default(),
        };
        reverb.set_params(params);
        reverb
    }

    /// Early reflection tap times: 5 ms, 13 ms, 21 ms, ...
    pub fn tap_time_ms(tap: usize) -> f32 {
        5.0 + tap as f32 * 8.0
    }

    pub fn set_room_size(&mut self, size: f32) {
        self.params.room_size = size.clamp(0.0, 1.0);
        self.late.set_room_size(self.params.room_size);
        self.late.set_size_scale(0.5 + 0.5 * self.params.room_size);
    }

    pub fn set_decay_time(&mut self, seconds: f32) {
        self.params.decay_time = seconds.clamp(0.1, 10.0);
        self.late.set_decay_time(Some(self.params.decay_time));
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.params.damping = damping.clamp(0.0, 1.0);
        self.late.set_damping(self.params.damping);
        self.update_damping_filter();
    }

    pub fn set_pre_delay(&mut self, ms: f32) {
        self.params.pre_delay_ms = ms.clamp(0.0, Self::MAX_PRE_DELAY_MS);
        if let Some(spec) = self.spec {
            self.pre_delay
                .set_delay(spec.ms_to_samples(self.params.pre_delay_ms));
        }
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.params.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_early_reflections(&mut self, amount: f32) {
        self.params.early_reflections = amount.clamp(0.0, 1.0);
        self.update_tap_gains();
    }

    pub fn set_late_reverb(&mut self, amount: f32) {
        self.params.late_reverb = amount.clamp(0.0, 1.0);
    }

    pub fn set_reverb_tail(&mut self, amount: f32) {
        self.params.reverb_tail = amount.clamp(0.0, 1.0);
    }

    pub fn set_room_shape(&mut self, shape: f32) {
        self.params.room_shape = shape.clamp(0.0, 1.0);
        self.update_tap_gains();
    }

    /// Pre-delay length in samples at the prepared rate
    pub fn pre_delay_samples(&self) -> usize {
        self.pre_delay.delay()
    }

    fn update_tap_gains(&mut self) {
        let shape = ROOM_SHAPE_OFFSET + self.params.room_shape * ROOM_SHAPE_OFFSET;
        for (tap, gain) in self.tap_gains.iter_mut().enumerate() {
            *gain = (1.0 - tap as f32 * EARLY_DECAY) * self.params.early_reflections * shape;
        }
    }

    fn update_damping_filter(&mut self) {
        let sr = self.spec.unwrap_or_default().sample_rate_f32();
        // More damping absorbs more of the top end
        let cutoff = (20000.0 - self.params.damping * 15000.0).clamp(1000.0, 20000.0);
        self.damping_filter.set_coeffs(BiquadCoeffs::lowpass(
            sr,
            cutoff,
            std::f32::consts::FRAC_1_SQRT_2,
        ));
    }

    pub fn params(&self) -> SpaceReverbParams {
        self.params
    }

    pub fn set_params(&mut self, params: SpaceReverbParams) {
        self.set_room_size(params.room_size);
        self.set_decay_time(params.decay_time);
        self.set_damping(params.damping);
        self.set_pre_delay(params.pre_delay_ms);
        self.set_mix(params.mix);
        self.set_early_reflections(params.early_reflections);
        self.set_late_reverb(params.late_reverb);
        self.set_reverb_tail(params.reverb_tail);
        self.set_room_shape(params.room_shape);
        trace!(
            "Space reverb updated: room {:.2}, decay {:.1}s, pre-delay {:.0}ms",
            self.params.room_size,
            self.params.decay_time,
            self.params.pre_delay_ms
        );
    }

    /// Pre-delay plus early reflections for one channel sample
    #[inline]
    fn reverb_input(&mut self, ch: usize, sample: f32) -> f32 {
        let delayed = self.pre_delay.process_sample(ch, sample);
        let mut early_sum = 0.0;
        if self.params.early_reflections > 0.0 {
            for (delay, gain) in self.tap_delays.iter().zip(&self.tap_gains) {
                early_sum += self.early.read(ch, *delay) * gain;
            }
        }
        // History keeps running while the taps are muted
        self.early.push(ch, delayed);
        delayed + early_sum * EARLY_MIX
    }

    /// Damping, tail gain and wet/dry crossfade
    #[inline]
    fn finish(&mut self, ch: usize, dry: f32, tail: f32) -> f32 {
        let wet = self.damping_filter.process_sample(ch, tail * WET_SCALE)
            * self.params.late_reverb
            * self.params.reverb_tail;
        dry * (1.0 - self.params.mix) + wet * self.params.mix
    }
}

impl Effect for SpaceReverb {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.pre_delay
            .prepare(spec.channels, spec.ms_to_samples(Self::MAX_PRE_DELAY_MS));
        self.early
            .prepare(spec.channels, spec.ms_to_samples(MAX_EARLY_MS));
        for (tap, delay) in self.tap_delays.iter_mut().enumerate() {
            *delay = spec.ms_to_samples(Self::tap_time_ms(tap)).max(1);
        }
        self.late.prepare(spec.sample_rate);
        self.damping_filter.prepare(spec.channels);
        self.update_damping_filter();
        self.set_pre_delay(self.params.pre_delay_ms);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;

        if let Some((left, right)) = buffer.stereo_mut() {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let in_l = self.reverb_input(0, *l);
                let in_r = self.reverb_input(1, *r);
                let (tail_l, tail_r) = self.late.process_stereo(in_l, in_r);
                *l = self.finish(0, *l, tail_l);
                *r = self.finish(1, *r, tail_r);
            }
        } else if buffer.num_channels() == 1 {
            for sample in buffer.channel_mut(0).iter_mut() {
                let input = self.reverb_input(0, *sample);
                let tail = self.late.process_mono(input);
                *sample = self.finish(0, *sample, tail);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.pre_delay.reset();
        self.early.reset();
        self.late.reset();
        self.damping_filter.reset();
    }

    fn name(&self) -> &str {
        "Space Reverb"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        let p = &self.params;
        match name {
            "room_size" => Some(p.room_size),
            "decay_time" => Some(p.decay_time),
            "damping" => Some(p.damping),
            "pre_delay" => Some(p.pre_delay_ms),
            "mix" => Some(p.mix),
            "early_reflections" => Some(p.early_reflections),
            "late_reverb" => Some(p.late_reverb),
            "reverb_tail" => Some(p.reverb_tail),
            "room_shape" => Some(p.room_shape),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "room_size" => self.set_room_size(value),
            "decay_time" => self.set_decay_time(value),
            "damping" => self.set_damping(value),
            "pre_delay" => self.set_pre_delay(value),
            "mix" => self.set_mix(value),
            "early_reflections" => self.set_early_reflections(value),
            "late_reverb" => self.set_late_reverb(value),
            "reverb_tail" => self.set_reverb_tail(value),
            "room_shape" => self.set_room_shape(value),
            _ => return false,
        }
        true
    }
}

/// Space reverb parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceReverbParams {
    pub room_size: f32,
    pub decay_time: f32,
    pub damping: f32,
    pub pre_delay_ms: f32,
    pub mix: f32,
    pub early_reflections: f32,
    pub late_reverb: f32,
    pub reverb_tail: f32,
    pub room_shape: f32,
}

impl Default for SpaceReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.7,
            decay_time: 2.5,
            damping: 0.5,
            pre_delay_ms: 30.0,
            mix: 0.3,
            early_reflections: 0.5,
            late_reverb: 0.7,
            reverb_tail: 0.8,
            room_shape: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_util::*;

    fn impulse(len: usize) -> AudioBuffer {
        let mut buffer = silence(len);
        buffer.channel_mut(0)[0] = 1.0;
        buffer.channel_mut(1)[0] = 1.0;
        buffer
    }

    // -------------------------------------------------------------------------
    // Late Reverb Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_late_reverb_produces_tail() {
        let mut late = LateReverb::default();
        late.prepare(SAMPLE_RATE);

        late.process_stereo(1.0, 1.0);
        let energy: f32 = (0..48000)
            .map(|_| {
                let (l, r) = late.process_stereo(0.0, 0.0);
                l * l + r * r
            })
            .sum();
        assert!(energy > 0.0);
    }

    #[test]
    fn test_late_reverb_decays() {
        let mut late = LateReverb::new(0.5, 0.5);
        late.prepare(SAMPLE_RATE);
        late.set_decay_time(Some(0.5));

        late.process_stereo(1.0, 1.0);
        let mut last_peak = 0.0_f32;
        for _ in 0..(48000 * 3) {
            let (l, _) = late.process_stereo(0.0, 0.0);
            last_peak = l.abs();
        }
        assert!(last_peak < 1e-4);
    }

    // -------------------------------------------------------------------------
    // Track Reverb Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_reverb_defaults() {
        let reverb = Reverb::default();
        assert_eq!(reverb.params(), ReverbParams::default());
        assert_eq!(reverb.name(), "Reverb");
    }

    #[test]
    fn test_reverb_dry_only_is_identity() {
        let mut reverb = Reverb::new(ReverbParams {
            wet_level: 0.0,
            dry_level: 1.0,
            ..Default::default()
        });
        reverb.prepare(&spec());

        let input = stereo_sine(BLOCK, 440.0, 0.5);
        let mut output = input.clone();
        reverb.process(&mut output).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_reverb_reset() {
        let mut reverb = Reverb::default();
        reverb.prepare(&spec());
        assert_reset_clears(&mut reverb);
    }

    // -------------------------------------------------------------------------
    // Cinematic Reverb Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_cinematic_defaults() {
        let reverb = CinematicReverb::default();
        let params = reverb.params();
        assert_eq!(params.pre_delay_ms, 30.0);
        assert_eq!(params.reverb.room_size, 0.8);
        assert_eq!(params.reverb.wet_level, 0.25);
    }

    #[test]
    fn test_cinematic_mix_sets_wet_and_dry() {
        let mut reverb = CinematicReverb::default();
        reverb.set_mix(0.4);
        let params = reverb.params();
        assert!((params.reverb.wet_level - 0.4).abs() < 1e-6);
        assert!((params.reverb.dry_level - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_cinematic_pre_delay_keeps_dry_aligned() {
        let mut reverb = CinematicReverb::new(CinematicReverbParams {
            pre_delay_ms: 5.0,
            ..Default::default()
        });
        reverb.set_mix(0.5);
        reverb.prepare(&spec());

        let mut buffer = impulse(BLOCK);
        reverb.process(&mut buffer).unwrap();

        // Dry impulse stays at sample 0, wet starts after 240 samples
        assert!((buffer.channel(0)[0] - 0.5).abs() < 1e-6);
        assert!(buffer.channel(0)[1..240].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_cinematic_reset() {
        let mut reverb = CinematicReverb::default();
        reverb.prepare(&spec());
        assert_reset_clears(&mut reverb);
    }

    // -------------------------------------------------------------------------
    // Space Reverb Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_space_reverb_defaults() {
        let reverb = SpaceReverb::default();
        assert_eq!(reverb.params(), SpaceReverbParams::default());
        assert_eq!(SpaceReverb::tap_time_ms(0), 5.0);
        assert_eq!(SpaceReverb::tap_time_ms(7), 61.0);
    }

    #[test]
    fn test_space_reverb_pre_delay_silence() {
        let mut reverb = SpaceReverb::new(SpaceReverbParams {
            pre_delay_ms: 10.0,
            mix: 1.0,
            ..Default::default()
        });
        reverb.prepare(&spec());
        assert_eq!(reverb.pre_delay_samples(), 480);

        let input = impulse(4800);
        let output = process_blocks(&mut reverb, &input);

        assert!(output.channel(0)[..480].iter().all(|&s| s == 0.0));
        assert!(output.channel(0)[480..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_space_reverb_dry_mix_is_identity() {
        let mut reverb = SpaceReverb::new(SpaceReverbParams {
            mix: 0.0,
            ..Default::default()
        });
        reverb.prepare(&spec());

        let input = stereo_sine(BLOCK, 440.0, 0.5);
        let mut output = input.clone();
        reverb.process(&mut output).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_space_reverb_clamps() {
        let mut reverb = SpaceReverb::default();
        reverb.set_pre_delay(500.0);
        reverb.set_decay_time(0.0);
        assert_eq!(reverb.params().pre_delay_ms, 200.0);
        assert_eq!(reverb.params().decay_time, 0.1);
        assert!(reverb.set_parameter("room_shape", 2.0));
        assert_eq!(reverb.parameter("room_shape"), Some(1.0));
    }

    #[test]
    fn test_space_reverb_mono_block() {
        let mut reverb = SpaceReverb::default();
        reverb.prepare(&spec());
        let mut mono = AudioBuffer::from_channels(vec![vec![0.5; 64]]);
        reverb.process(&mut mono).unwrap();
        assert!(mono.channel(0).iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_space_reverb_muted_taps_keep_history_current() {
        let mut reverb = SpaceReverb::new(SpaceReverbParams {
            pre_delay_ms: 0.0,
            early_reflections: 0.8,
            ..Default::default()
        });
        reverb.prepare(&spec());
        process_blocks(&mut reverb, &impulse(BLOCK));

        // Long enough silence with the taps muted flushes the impulse
        reverb.set_early_reflections(0.0);
        process_blocks(&mut reverb, &silence(BLOCK * 20));
        reverb.set_early_reflections(0.8);

        for delay in reverb.tap_delays {
            assert_eq!(reverb.early.read(0, delay), 0.0);
            assert_eq!(reverb.early.read(1, delay), 0.0);
        }
    }

    #[test]
    fn test_space_reverb_reset() {
        let mut reverb = SpaceReverb::default();
        reverb.prepare(&spec());
        assert_reset_clears(&mut reverb);
    }
}
