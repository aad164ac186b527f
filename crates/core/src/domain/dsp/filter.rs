//! Biquad and crossover filters shared by the DSP stages
//!
//! Every stage that filters a multichannel block keeps one filter state per
//! channel, sized in `prepare`, with a single coefficient set shared by all
//! channels.

use super::{gain_to_db, params};
use serde::{Deserialize, Serialize};

// ============================================================================
// BIQUAD COEFFICIENTS
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Angular frequency terms shared by every RBJ design
struct Prewarp {
    cos_w0: f32,
    alpha: f32,
}

impl Prewarp {
    fn new(sample_rate: f32, freq: f32, q: f32) -> Self {
        // Keep the cutoff strictly inside (0, nyquist)
        let freq = freq.clamp(1.0, sample_rate * 0.49);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        Self {
            cos_w0: w0.cos(),
            alpha: w0.sin() / (2.0 * q.max(0.01)),
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the cutoff frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Corner frequency in Hz
    /// - `gain_db`: Boost/cut in decibels (clamped to +/- 12dB)
    /// - `q`: Q factor (resonance), typically 0.5-1.0
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha,
        )
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the cutoff frequency.
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_w0 + sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - sqrt_a_alpha,
        )
    }

    /// High shelf with the gain given as a linear factor
    #[must_use]
    pub fn high_shelf_linear(sample_rate: f32, freq: f32, gain: f32, q: f32) -> Self {
        Self::high_shelf(sample_rate, freq, gain_to_db(gain), q)
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(params::EQ_GAIN_MIN, params::EQ_GAIN_MAX);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Second-order low-pass
    #[must_use]
    pub fn lowpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let b1 = 1.0 - cos_w0;

        Self::normalized(
            b1 / 2.0,
            b1,
            b1 / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Second-order high-pass
    #[must_use]
    pub fn highpass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let Prewarp { cos_w0, alpha } = Prewarp::new(sample_rate, freq, q);
        let b0 = (1.0 + cos_w0) / 2.0;

        Self::normalized(
            b0,
            -(1.0 + cos_w0),
            b0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I is chosen over Transposed Direct Form II for:
/// - Better numerical stability with low-frequency filters
/// - Easier coefficient updates without artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients
    ///
    /// Can be called in real-time for parameter changes.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// PER-CHANNEL FILTER BANK
// ============================================================================

/// One biquad per channel, all sharing a coefficient set
#[derive(Debug, Clone, Default)]
pub struct ChannelFilters {
    coeffs: BiquadCoeffs,
    filters: Vec<BiquadFilter>,
}

impl ChannelFilters {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            filters: Vec::new(),
        }
    }

    /// Size the bank for `channels`, keeping existing history
    pub fn prepare(&mut self, channels: usize) {
        if self.filters.len() < channels {
            self.filters
                .resize_with(channels, || BiquadFilter::new(self.coeffs));
        }
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    pub fn num_channels(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn process_sample(&mut self, ch: usize, x: f32) -> f32 {
        self.filters[ch].process_sample(x)
    }

    pub fn process_channel(&mut self, ch: usize, samples: &mut [f32]) {
        if let Some(filter) = self.filters.get_mut(ch) {
            filter.process(samples);
        }
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

// ============================================================================
// LINKWITZ-RILEY CROSSOVER
// ============================================================================

/// Which half of the spectrum a crossover passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossoverKind {
    Lowpass,
    Highpass,
}

/// Fourth-order Linkwitz-Riley filter, two cascaded Butterworth sections
#[derive(Debug, Clone)]
pub struct Crossover {
    kind: CrossoverKind,
    cutoff: f32,
    sample_rate: f32,
    stages: Vec<[BiquadFilter; 2]>,
}

impl Crossover {
    pub fn new(kind: CrossoverKind, cutoff: f32) -> Self {
        Self {
            kind,
            cutoff,
            sample_rate: 44100.0,
            stages: Vec::new(),
        }
    }

    pub fn lowpass(cutoff: f32) -> Self {
        Self::new(CrossoverKind::Lowpass, cutoff)
    }

    pub fn highpass(cutoff: f32) -> Self {
        Self::new(CrossoverKind::Highpass, cutoff)
    }

    pub fn prepare(&mut self, sample_rate: f32, channels: usize) {
        self.sample_rate = sample_rate;
        if self.stages.len() < channels {
            self.stages.resize_with(channels, Default::default);
        }
        self.update_coefficients();
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff;
        self.update_coefficients();
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn kind(&self) -> CrossoverKind {
        self.kind
    }

    fn update_coefficients(&mut self) {
        let coeffs = match self.kind {
            CrossoverKind::Lowpass => {
                BiquadCoeffs::lowpass(self.sample_rate, self.cutoff, params::BUTTERWORTH_Q)
            }
            CrossoverKind::Highpass => {
                BiquadCoeffs::highpass(self.sample_rate, self.cutoff, params::BUTTERWORTH_Q)
            }
        };
        for [first, second] in &mut self.stages {
            first.set_coeffs(coeffs);
            second.set_coeffs(coeffs);
        }
    }

    #[inline]
    pub fn process_sample(&mut self, ch: usize, x: f32) -> f32 {
        let [first, second] = &mut self.stages[ch];
        second.process_sample(first.process_sample(x))
    }

    pub fn process_channel(&mut self, ch: usize, samples: &mut [f32]) {
        if let Some([first, second]) = self.stages.get_mut(ch) {
            for sample in samples.iter_mut() {
                *sample = second.process_sample(first.process_sample(*sample));
            }
        }
    }

    pub fn reset(&mut self) {
        for [first, second] in &mut self.stages {
            first.reset();
            second.reset();
        }
    }
}
