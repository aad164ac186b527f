//! Lock-free level metering shared between the audio and UI sides
//!
//! The audio thread publishes block levels through relaxed atomic stores;
//! readers take snapshots at their own pace.

use crate::domain::audio::AudioBuffer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Floor for meter readings in decibels
pub const METER_FLOOR_DB: f32 = -60.0;

/// `f32` stored as its bit pattern in an `AtomicU32`
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Convert a linear level to meter decibels, floored at [`METER_FLOOR_DB`]
#[inline]
pub fn level_to_db(level: f32) -> f32 {
    if level > 0.0 {
        (20.0 * level.log10()).max(METER_FLOOR_DB)
    } else {
        METER_FLOOR_DB
    }
}

/// Estimate the fundamental of channel 0 from its zero-crossing rate
///
/// `crossings * sample_rate / (2 * samples)`; returns 0 for blocks shorter
/// than two samples.
pub fn estimate_pitch(buffer: &AudioBuffer, sample_rate: f64) -> f32 {
    let n = buffer.num_samples();
    if n < 2 || buffer.num_channels() == 0 {
        return 0.0;
    }
    let data = buffer.channel(0);
    let crossings = data
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    (crossings as f64 * sample_rate / (2.0 * n as f64)) as f32
}

/// RMS, peak and held peak of one signal point
#[derive(Debug)]
pub struct LevelMeter {
    rms: AtomicF32,
    peak: AtomicF32,
    peak_hold_db: AtomicF32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            rms: AtomicF32::new(0.0),
            peak: AtomicF32::new(0.0),
            peak_hold_db: AtomicF32::new(METER_FLOOR_DB),
        }
    }

    /// Publish the levels of one block
    pub fn update(&self, buffer: &AudioBuffer) {
        let rms = buffer.rms();
        let peak = buffer.peak();
        self.rms.store(rms);
        self.peak.store(peak);
        let peak_db = level_to_db(peak);
        if peak_db > self.peak_hold_db.load() {
            self.peak_hold_db.store(peak_db);
        }
    }

    pub fn rms(&self) -> f32 {
        self.rms.load()
    }

    pub fn peak(&self) -> f32 {
        self.peak.load()
    }

    pub fn rms_db(&self) -> f32 {
        level_to_db(self.rms())
    }

    pub fn peak_hold_db(&self) -> f32 {
        self.peak_hold_db.load()
    }

    /// Let the held peak fall by `amount_db` (call periodically)
    pub fn decay_peak(&self, amount_db: f32) {
        let held = (self.peak_hold_db.load() - amount_db).max(METER_FLOOR_DB);
        self.peak_hold_db.store(held);
    }

    pub fn reset(&self) {
        self.rms.store(0.0);
        self.peak.store(0.0);
        self.peak_hold_db.store(METER_FLOOR_DB);
    }
}

/// Input/output meters plus pitch and loudness readouts
#[derive(Debug)]
pub struct Meters {
    pub input: LevelMeter,
    pub output: LevelMeter,
    pitch_hz: AtomicF32,
    loudness_db: AtomicF32,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            input: LevelMeter::new(),
            output: LevelMeter::new(),
            pitch_hz: AtomicF32::new(0.0),
            loudness_db: AtomicF32::new(METER_FLOOR_DB),
        }
    }
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pitch(&self, hz: f32) {
        self.pitch_hz.store(hz);
    }

    pub fn pitch(&self) -> f32 {
        self.pitch_hz.load()
    }

    pub fn set_loudness(&self, db: f32) {
        self.loudness_db.store(db);
    }

    /// Last measured loudness in dB
    pub fn loudness(&self) -> f32 {
        self.loudness_db.load()
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            input_rms: self.input.rms(),
            output_rms: self.output.rms(),
            input_peak: self.input.peak(),
            output_peak: self.output.peak(),
            output_peak_hold_db: self.output.peak_hold_db(),
            pitch_hz: self.pitch(),
            loudness_db: self.loudness(),
        }
    }

    pub fn reset(&self) {
        self.input.reset();
        self.output.reset();
        self.pitch_hz.store(0.0);
        self.loudness_db.store(METER_FLOOR_DB);
    }
}

/// Plain copy of the meter values at one moment
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub input_rms: f32,
    pub output_rms: f32,
    pub input_peak: f32,
    pub output_peak: f32,
    pub output_peak_hold_db: f32,
    pub pitch_hz: f32,
    pub loudness_db: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::test_util::*;

    #[test]
    fn test_atomic_f32() {
        let value = AtomicF32::new(0.25);
        assert_eq!(value.load(), 0.25);
        value.store(-3.5);
        assert_eq!(value.load(), -3.5);
    }

    #[test]
    fn test_level_to_db() {
        assert_eq!(level_to_db(0.0), METER_FLOOR_DB);
        assert_eq!(level_to_db(1e-9), METER_FLOOR_DB);
        assert!((level_to_db(0.5) + 6.02).abs() < 0.01);
        assert!((level_to_db(2.0) - 6.02).abs() < 0.01);
    }

    #[test]
    fn test_pitch_estimate() {
        // Ten cycles of 100 Hz give 19 interior crossings
        let buffer = stereo_sine(4800, 100.0, 0.5);
        let pitch = estimate_pitch(&buffer, SAMPLE_RATE);
        assert!((pitch - 100.0).abs() < 6.0, "pitch {}", pitch);
        assert_eq!(estimate_pitch(&silence(1), SAMPLE_RATE), 0.0);
    }

    #[test]
    fn test_level_meter() {
        let meter = LevelMeter::new();
        let buffer = stereo_sine(BLOCK, 1000.0, 0.5);
        meter.update(&buffer);
        assert!((meter.rms() - 0.3535).abs() < 0.01);
        assert!((meter.peak() - 0.5).abs() < 0.01);
        let held = meter.peak_hold_db();
        assert!((held + 6.02).abs() < 0.1);

        meter.update(&silence(BLOCK));
        assert_eq!(meter.peak_hold_db(), held);
        meter.decay_peak(100.0);
        assert_eq!(meter.peak_hold_db(), METER_FLOOR_DB);
    }

    #[test]
    fn test_meter_snapshot() {
        let meters = Meters::new();
        meters.input.update(&stereo_sine(BLOCK, 1000.0, 0.5));
        meters.set_pitch(220.0);
        let snapshot = meters.snapshot();
        assert!(snapshot.input_rms > 0.3);
        assert_eq!(snapshot.output_rms, 0.0);
        assert_eq!(snapshot.pitch_hz, 220.0);

        meters.set_loudness(-14.5);
        assert_eq!(meters.snapshot().loudness_db, -14.5);

        meters.reset();
        assert_eq!(meters.snapshot().pitch_hz, 0.0);
        assert_eq!(meters.snapshot().loudness_db, METER_FLOOR_DB);
    }
}
