//! Three-band compressor with subtractive mid band
//!
//! Low and high bands come from a matched pair of Linkwitz-Riley filters.
//! The mid band is whatever remains, `x - low - high`, so the three bands
//! always sum back to the input before any band gain is applied.

use super::dynamics::{Compressor, CompressorParams};
use super::filter::Crossover;
use super::{params, prepared_spec, Effect, Result};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Frequency band selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    Low,
    Mid,
    High,
}

/// Dynamics settings of one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl BandSettings {
    pub const fn new(threshold_db: f32, ratio: f32, attack_ms: f32, release_ms: f32) -> Self {
        Self {
            threshold_db,
            ratio,
            attack_ms,
            release_ms,
        }
    }

    fn compressor_params(&self) -> CompressorParams {
        CompressorParams {
            threshold_db: self.threshold_db,
            ratio: self.ratio,
            attack_ms: self.attack_ms,
            release_ms: self.release_ms,
            makeup_gain_db: 0.0,
        }
    }
}

impl Default for BandSettings {
    fn default() -> Self {
        Self::new(-20.0, 4.0, 10.0, 100.0)
    }
}

/// Multiband compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultibandParams {
    pub low_crossover_hz: f32,
    pub high_crossover_hz: f32,
    pub low: BandSettings,
    pub mid: BandSettings,
    pub high: BandSettings,
}

impl Default for MultibandParams {
    fn default() -> Self {
        Self {
            low_crossover_hz: 200.0,
            high_crossover_hz: 4000.0,
            low: BandSettings::new(-18.0, 3.0, 20.0, 150.0),
            mid: BandSettings::new(-15.0, 2.5, 10.0, 100.0),
            high: BandSettings::new(-12.0, 2.0, 5.0, 80.0),
        }
    }
}

impl MultibandParams {
    /// Band settings used on the mastering bus
    pub fn mastering() -> Self {
        Self {
            low: BandSettings::new(-20.0, 4.0, 10.0, 100.0),
            mid: BandSettings::new(-15.0, 3.0, 5.0, 80.0),
            high: BandSettings::new(-12.0, 2.0, 2.0, 60.0),
            ..Default::default()
        }
    }
}

/// Three-band compressor
#[derive(Debug, Clone)]
pub struct MultibandCompressor {
    params: MultibandParams,
    spec: Option<ProcessSpec>,
    low_crossover: Crossover,
    high_crossover: Crossover,
    compressors: [Compressor; 3],
    bands: [AudioBuffer; 3],
}

impl Default for MultibandCompressor {
    fn default() -> Self {
        Self::new(MultibandParams::default())
    }
}

impl MultibandCompressor {
    pub fn new(params: MultibandParams) -> Self {
        let mut multiband = Self {
            params,
            spec: None,
            low_crossover: Crossover::lowpass(params.low_crossover_hz),
            high_crossover: Crossover::highpass(params.high_crossover_hz),
            compressors: Default::default(),
            bands: Default::default(),
        };
        multiband.set_params(params);
        multiband
    }

    fn index(band: Band) -> usize {
        match band {
            Band::Low => 0,
            Band::Mid => 1,
            Band::High => 2,
        }
    }

    /// Replace the settings of one band
    pub fn set_band(&mut self, band: Band, settings: BandSettings) {
        let settings = BandSettings {
            threshold_db: settings.threshold_db.clamp(params::DB_MIN, 0.0),
            ratio: settings.ratio.clamp(params::RATIO_MIN, params::RATIO_MAX),
            attack_ms: settings
                .attack_ms
                .clamp(params::ATTACK_MS_MIN, params::ATTACK_MS_MAX),
            release_ms: settings
                .release_ms
                .clamp(params::RELEASE_MS_MIN, params::RELEASE_MS_MAX),
        };
        match band {
            Band::Low => self.params.low = settings,
            Band::Mid => self.params.mid = settings,
            Band::High => self.params.high = settings,
        }
        self.compressors[Self::index(band)].set_params(settings.compressor_params());
    }

    pub fn band_settings(&self, band: Band) -> BandSettings {
        match band {
            Band::Low => self.params.low,
            Band::Mid => self.params.mid,
            Band::High => self.params.high,
        }
    }

    pub fn set_threshold(&mut self, band: Band, threshold_db: f32) {
        let settings = BandSettings {
            threshold_db,
            ..self.band_settings(band)
        };
        self.set_band(band, settings);
    }

    pub fn set_ratio(&mut self, band: Band, ratio: f32) {
        let settings = BandSettings {
            ratio,
            ..self.band_settings(band)
        };
        self.set_band(band, settings);
    }

    pub fn set_attack(&mut self, band: Band, attack_ms: f32) {
        let settings = BandSettings {
            attack_ms,
            ..self.band_settings(band)
        };
        self.set_band(band, settings);
    }

    pub fn set_release(&mut self, band: Band, release_ms: f32) {
        let settings = BandSettings {
            release_ms,
            ..self.band_settings(band)
        };
        self.set_band(band, settings);
    }

    /// Move the low/mid split
    pub fn set_low_crossover(&mut self, hz: f32) {
        self.params.low_crossover_hz = hz.clamp(20.0, self.params.high_crossover_hz);
        self.low_crossover.set_cutoff(self.params.low_crossover_hz);
    }

    /// Move the mid/high split
    pub fn set_high_crossover(&mut self, hz: f32) {
        self.params.high_crossover_hz = hz.clamp(self.params.low_crossover_hz, 20000.0);
        self.high_crossover.set_cutoff(self.params.high_crossover_hz);
    }

    pub fn params(&self) -> MultibandParams {
        self.params
    }

    pub fn set_params(&mut self, params: MultibandParams) {
        self.params.low_crossover_hz = params.low_crossover_hz.clamp(20.0, 20000.0);
        self.params.high_crossover_hz = params
            .high_crossover_hz
            .clamp(self.params.low_crossover_hz, 20000.0);
        self.low_crossover.set_cutoff(self.params.low_crossover_hz);
        self.high_crossover.set_cutoff(self.params.high_crossover_hz);
        self.set_band(Band::Low, params.low);
        self.set_band(Band::Mid, params.mid);
        self.set_band(Band::High, params.high);
        trace!(
            "Multiband updated: crossovers {:.0}Hz / {:.0}Hz",
            self.params.low_crossover_hz,
            self.params.high_crossover_hz
        );
    }

    /// Split `input` into the three band buffers without compressing
    pub fn split_bands(&mut self, input: &AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, input)?;
        let n = input.num_samples();
        let [low, mid, high] = &mut self.bands;
        for band in [&mut *low, &mut *mid, &mut *high] {
            band.set_num_samples(n)?;
        }

        for ch in 0..input.num_channels() {
            let original = input.channel(ch);

            let low_data = low.channel_mut(ch);
            low_data.copy_from_slice(original);
            self.low_crossover.process_channel(ch, low_data);

            let high_data = high.channel_mut(ch);
            high_data.copy_from_slice(original);
            self.high_crossover.process_channel(ch, high_data);

            let low_data = low.channel(ch);
            let high_data = high.channel(ch);
            for (i, m) in mid.channel_mut(ch).iter_mut().enumerate() {
                *m = original[i] - low_data[i] - high_data[i];
            }
        }
        Ok(())
    }

    /// Band buffer filled by the last split
    pub fn band(&self, band: Band) -> &AudioBuffer {
        &self.bands[Self::index(band)]
    }
}

impl Effect for MultibandCompressor {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        let sr = spec.sample_rate_f32();
        self.low_crossover.prepare(sr, spec.channels);
        self.high_crossover.prepare(sr, spec.channels);
        for compressor in &mut self.compressors {
            compressor.prepare(spec);
        }
        for band in &mut self.bands {
            band.ensure_capacity(spec.channels, spec.max_block_size);
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.split_bands(buffer)?;

        for ch in 0..buffer.num_channels() {
            for (compressor, band) in self.compressors.iter_mut().zip(self.bands.iter_mut()) {
                compressor.process_channel(ch, band.channel_mut(ch));
            }

            let [low, mid, high] = &self.bands;
            let (low, mid, high) = (low.channel(ch), mid.channel(ch), high.channel(ch));
            for (i, out) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *out = low[i] + mid[i] + high[i];
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.low_crossover.reset();
        self.high_crossover.reset();
        for compressor in &mut self.compressors {
            compressor.reset();
        }
    }

    fn name(&self) -> &str {
        "Multiband Compressor"
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        let (band, field) = match name {
            "low_crossover" => return Some(self.params.low_crossover_hz),
            "high_crossover" => return Some(self.params.high_crossover_hz),
            _ => name.split_once('_')?,
        };
        let settings = match band {
            "low" => self.params.low,
            "mid" => self.params.mid,
            "high" => self.params.high,
            _ => return None,
        };
        match field {
            "threshold" => Some(settings.threshold_db),
            "ratio" => Some(settings.ratio),
            "attack" => Some(settings.attack_ms),
            "release" => Some(settings.release_ms),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        match name {
            "low_crossover" => {
                self.set_low_crossover(value);
                return true;
            }
            "high_crossover" => {
                self.set_high_crossover(value);
                return true;
            }
            _ => {}
        }
        let Some((band, field)) = name.split_once('_') else {
            return false;
        };
        let band = match band {
            "low" => Band::Low,
            "mid" => Band::Mid,
            "high" => Band::High,
            _ => return false,
        };
        match field {
            "threshold" => self.set_threshold(band, value),
            "ratio" => self.set_ratio(band, value),
            "attack" => self.set_attack(band, value),
            "release" => self.set_release(band, value),
            _ => return false,
        }
        true
    }
}
