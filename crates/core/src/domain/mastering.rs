//! Mastering orchestrator
//!
//! A fixed-order chain of vocal, multi-effect and mastering stages, each
//! with its own enable flag:
//!
//! high-pass → presence EQ → compressor → modulation → saturation → delay →
//! reverb → multiband → stereo imager → loudness normalizer → final limiter
//!
//! Presets only change parameters and flags. They never reorder stages.

use crate::domain::audio::{AudioBuffer, ProcessSpec};
use crate::domain::dsp::{
    prepared_spec, CinematicReverb, Compressor, Effect, FinalLimiter, HighPassFilter,
    LoudnessNormalizer, Modulation, MultibandCompressor, MultibandParams, PresenceEq, Result,
    Saturator, StereoImager, SubtleDelay,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, trace};

// ============================================================================
// PRESETS AND FLAGS
// ============================================================================

/// Factory presets of the mastering chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteringPreset {
    /// Vocal chain with hall reverb and a quarter-note style echo
    CinematicVocal,
    /// Mastering stages only, with light saturation
    CinematicMastering,
    /// Brighter, louder and wider, with chorus and saturation
    ViralAppeal,
}

impl MasteringPreset {
    pub const ALL: [MasteringPreset; 3] = [
        MasteringPreset::CinematicVocal,
        MasteringPreset::CinematicMastering,
        MasteringPreset::ViralAppeal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MasteringPreset::CinematicVocal => "cinematic_vocal",
            MasteringPreset::CinematicMastering => "cinematic_mastering",
            MasteringPreset::ViralAppeal => "viral_appeal",
        }
    }
}

impl fmt::Display for MasteringPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MasteringPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        MasteringPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| format!("unknown mastering preset '{}'", s))
    }
}

/// Enable flag for every stage of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub high_pass: bool,
    pub presence_eq: bool,
    pub compressor: bool,
    pub modulation: bool,
    pub saturation: bool,
    pub delay: bool,
    pub reverb: bool,
    pub multiband: bool,
    pub imager: bool,
    pub normalizer: bool,
    pub limiter: bool,
}

impl Default for StageFlags {
    fn default() -> Self {
        Self {
            high_pass: true,
            presence_eq: true,
            compressor: true,
            modulation: false,
            saturation: false,
            delay: false,
            reverb: true,
            multiband: true,
            imager: true,
            normalizer: true,
            limiter: true,
        }
    }
}

impl StageFlags {
    /// Every stage off
    pub fn none() -> Self {
        Self {
            high_pass: false,
            presence_eq: false,
            compressor: false,
            modulation: false,
            saturation: false,
            delay: false,
            reverb: false,
            multiband: false,
            imager: false,
            normalizer: false,
            limiter: false,
        }
    }

    fn get(&self, key: &str) -> Option<bool> {
        Some(match key {
            "high_pass" => self.high_pass,
            "presence" => self.presence_eq,
            "compressor" => self.compressor,
            "modulation" => self.modulation,
            "saturation" => self.saturation,
            "delay" => self.delay,
            "reverb" => self.reverb,
            "multiband" => self.multiband,
            "imager" => self.imager,
            "normalizer" => self.normalizer,
            "limiter" => self.limiter,
            _ => return None,
        })
    }

    fn flag_mut(&mut self, key: &str) -> Option<&mut bool> {
        Some(match key {
            "high_pass" => &mut self.high_pass,
            "presence" => &mut self.presence_eq,
            "compressor" => &mut self.compressor,
            "modulation" => &mut self.modulation,
            "saturation" => &mut self.saturation,
            "delay" => &mut self.delay,
            "reverb" => &mut self.reverb,
            "multiband" => &mut self.multiband,
            "imager" => &mut self.imager,
            "normalizer" => &mut self.normalizer,
            "limiter" => &mut self.limiter,
            _ => return None,
        })
    }
}

/// Stage keys in processing order, used by the dotted parameter surface
pub const STAGE_KEYS: [&str; 11] = [
    "high_pass",
    "presence",
    "compressor",
    "modulation",
    "saturation",
    "delay",
    "reverb",
    "multiband",
    "imager",
    "normalizer",
    "limiter",
];

/// Snapshot of the chain's user-facing settings
///
/// This is what presets on disk and the session config persist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasteringParams {
    pub flags: StageFlags,
    pub high_pass_hz: f32,
    pub presence_hz: f32,
    pub presence_gain_db: f32,
    pub compressor_threshold_db: f32,
    pub compressor_ratio: f32,
    pub reverb_size: f32,
    pub reverb_mix: f32,
    pub reverb_pre_delay_ms: f32,
    pub delay_ms: f32,
    pub delay_mix: f32,
    pub modulation_rate_hz: f32,
    pub modulation_depth: f32,
    pub modulation_mix: f32,
    pub saturation_drive: f32,
    pub stereo_width: f32,
    pub target_lufs: f32,
    pub limiter_ceiling_db: f32,
}

impl Default for MasteringParams {
    fn default() -> Self {
        MasteringChain::new().params()
    }
}

// ============================================================================
// MASTERING CHAIN
// ============================================================================

/// Fixed-order mastering chain
#[derive(Debug, Clone)]
pub struct MasteringChain {
    flags: StageFlags,
    spec: Option<ProcessSpec>,
    high_pass: HighPassFilter,
    presence: PresenceEq,
    compressor: Compressor,
    modulation: Modulation,
    saturation: Saturator,
    delay: SubtleDelay,
    reverb: CinematicReverb,
    multiband: MultibandCompressor,
    imager: StereoImager,
    normalizer: LoudnessNormalizer,
    limiter: FinalLimiter,
}

impl Default for MasteringChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MasteringChain {
    /// Build the chain with the cinematic vocal preset applied
    pub fn new() -> Self {
        let mut imager = StereoImager::default();
        imager.set_width(1.2);
        let mut chain = Self {
            flags: StageFlags::default(),
            spec: None,
            high_pass: HighPassFilter::default(),
            presence: PresenceEq::default(),
            compressor: Compressor::gentle(),
            modulation: Modulation::default(),
            saturation: Saturator::warm(),
            delay: SubtleDelay::default(),
            reverb: CinematicReverb::default(),
            multiband: MultibandCompressor::new(MultibandParams::mastering()),
            imager,
            normalizer: LoudnessNormalizer::default(),
            limiter: FinalLimiter::new(-0.1),
        };
        chain.apply_preset(MasteringPreset::CinematicVocal);
        chain
    }

    /// Apply a factory preset as a sequence of parameter writes
    pub fn apply_preset(&mut self, preset: MasteringPreset) {
        match preset {
            MasteringPreset::CinematicVocal => {
                self.flags.high_pass = true;
                self.high_pass.set_cutoff(80.0);
                self.flags.presence_eq = true;
                self.presence.set_frequency(4000.0);
                self.presence.set_gain(3.0);
                self.flags.compressor = true;
                self.compressor.set_threshold(-18.0);
                self.compressor.set_ratio(2.0);
                self.flags.reverb = true;
                self.reverb.set_room_size(0.8);
                self.reverb.set_mix(0.25);
                self.reverb.set_pre_delay(30.0);
                self.flags.delay = true;
                self.delay.set_delay_time(300.0);
                self.delay.set_mix(0.15);
                self.flags.modulation = false;
                self.flags.saturation = false;
                self.apply_master_bus(1.2, -14.0);
            }
            MasteringPreset::CinematicMastering => {
                self.flags.high_pass = false;
                self.flags.presence_eq = false;
                self.flags.compressor = false;
                self.flags.reverb = false;
                self.flags.delay = false;
                self.flags.modulation = false;
                self.flags.saturation = true;
                self.saturation.set_drive(0.1);
                self.apply_master_bus(1.3, -14.0);
            }
            MasteringPreset::ViralAppeal => {
                self.flags.high_pass = true;
                self.high_pass.set_cutoff(100.0);
                self.flags.presence_eq = true;
                self.presence.set_frequency(5000.0);
                self.presence.set_gain(4.0);
                self.flags.compressor = true;
                self.compressor.set_threshold(-15.0);
                self.compressor.set_ratio(3.0);
                self.flags.reverb = true;
                self.reverb.set_room_size(0.5);
                self.reverb.set_mix(0.2);
                self.reverb.set_pre_delay(20.0);
                self.flags.delay = true;
                self.delay.set_delay_time(250.0);
                self.delay.set_mix(0.1);
                self.flags.modulation = true;
                self.modulation.set_rate(0.3);
                self.modulation.set_depth(0.2);
                self.modulation.set_mix(0.15);
                self.flags.saturation = true;
                self.saturation.set_drive(0.15);
                self.apply_master_bus(1.4, -12.0);
            }
        }
        info!("Applied mastering preset '{}'", preset);
    }

    fn apply_master_bus(&mut self, width: f32, target_lufs: f32) {
        self.flags.multiband = true;
        self.flags.imager = true;
        self.imager.set_width(width);
        self.flags.normalizer = true;
        self.normalizer.set_target(target_lufs);
        self.flags.limiter = true;
        self.limiter.set_ceiling(-0.1);
    }

    pub fn flags(&self) -> StageFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: StageFlags) {
        self.flags = flags;
    }

    pub fn set_high_pass_cutoff(&mut self, hz: f32) {
        self.high_pass.set_cutoff(hz);
    }

    pub fn set_presence(&mut self, hz: f32, gain_db: f32) {
        self.presence.set_frequency(hz);
        self.presence.set_gain(gain_db);
    }

    pub fn set_compressor(&mut self, threshold_db: f32, ratio: f32) {
        self.compressor.set_threshold(threshold_db);
        self.compressor.set_ratio(ratio);
    }

    pub fn set_reverb(&mut self, size: f32, mix: f32, pre_delay_ms: f32) {
        self.reverb.set_room_size(size);
        self.reverb.set_mix(mix);
        self.reverb.set_pre_delay(pre_delay_ms);
    }

    pub fn set_delay(&mut self, ms: f32, mix: f32) {
        self.delay.set_delay_time(ms);
        self.delay.set_mix(mix);
    }

    /// Lock the echo to a quarter note of the session tempo
    pub fn sync_delay_to_bpm(&mut self, bpm: f64) {
        self.delay.sync_to_bpm(bpm);
    }

    pub fn set_modulation(&mut self, rate_hz: f32, depth: f32, mix: f32) {
        self.modulation.set_rate(rate_hz);
        self.modulation.set_depth(depth);
        self.modulation.set_mix(mix);
    }

    pub fn set_saturation_drive(&mut self, drive: f32) {
        self.saturation.set_drive(drive);
    }

    pub fn set_stereo_width(&mut self, width: f32) {
        self.imager.set_width(width);
    }

    pub fn set_target_lufs(&mut self, lufs: f32) {
        self.normalizer.set_target(lufs);
    }

    pub fn set_limiter_ceiling(&mut self, ceiling_db: f32) {
        self.limiter.set_ceiling(ceiling_db);
    }

    /// Level measured by the normalizer at its last window, in dB
    pub fn current_loudness(&self) -> f32 {
        self.normalizer.measured_level_db()
    }

    pub fn params(&self) -> MasteringParams {
        let presence = self.presence.params();
        let compressor = self.compressor.params();
        let reverb = self.reverb.params();
        let delay = self.delay.params();
        let modulation = self.modulation.params();
        MasteringParams {
            flags: self.flags,
            high_pass_hz: self.high_pass.cutoff(),
            presence_hz: presence.frequency,
            presence_gain_db: presence.gain_db,
            compressor_threshold_db: compressor.threshold_db,
            compressor_ratio: compressor.ratio,
            reverb_size: reverb.reverb.room_size,
            reverb_mix: reverb.reverb.wet_level,
            reverb_pre_delay_ms: reverb.pre_delay_ms,
            delay_ms: delay.delay_ms,
            delay_mix: delay.mix,
            modulation_rate_hz: modulation.rate_hz,
            modulation_depth: modulation.depth,
            modulation_mix: modulation.mix,
            saturation_drive: self.saturation.params().drive,
            stereo_width: self.imager.width(),
            target_lufs: self.normalizer.target(),
            limiter_ceiling_db: self.limiter.ceiling(),
        }
    }

    pub fn set_params(&mut self, params: MasteringParams) {
        self.flags = params.flags;
        self.set_high_pass_cutoff(params.high_pass_hz);
        self.set_presence(params.presence_hz, params.presence_gain_db);
        self.set_compressor(params.compressor_threshold_db, params.compressor_ratio);
        self.set_reverb(
            params.reverb_size,
            params.reverb_mix,
            params.reverb_pre_delay_ms,
        );
        self.set_delay(params.delay_ms, params.delay_mix);
        self.set_modulation(
            params.modulation_rate_hz,
            params.modulation_depth,
            params.modulation_mix,
        );
        self.set_saturation_drive(params.saturation_drive);
        self.set_stereo_width(params.stereo_width);
        self.set_target_lufs(params.target_lufs);
        self.set_limiter_ceiling(params.limiter_ceiling_db);
        trace!("Mastering chain parameters restored");
    }

    /// Names of the enabled stages, in processing order
    pub fn active_stages(&self) -> Vec<&str> {
        STAGE_KEYS
            .iter()
            .zip(self.stages())
            .filter(|(key, _)| self.flags.get(key).unwrap_or(false))
            .map(|(_, stage)| stage.name())
            .collect()
    }

    fn stages(&self) -> [&dyn Effect; 11] {
        [
            &self.high_pass,
            &self.presence,
            &self.compressor,
            &self.modulation,
            &self.saturation,
            &self.delay,
            &self.reverb,
            &self.multiband,
            &self.imager,
            &self.normalizer,
            &self.limiter,
        ]
    }

    fn stages_mut(&mut self) -> [&mut dyn Effect; 11] {
        [
            &mut self.high_pass,
            &mut self.presence,
            &mut self.compressor,
            &mut self.modulation,
            &mut self.saturation,
            &mut self.delay,
            &mut self.reverb,
            &mut self.multiband,
            &mut self.imager,
            &mut self.normalizer,
            &mut self.limiter,
        ]
    }

    fn stage_index(key: &str) -> Option<usize> {
        STAGE_KEYS.iter().position(|k| *k == key)
    }
}

impl Effect for MasteringChain {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        for stage in self.stages_mut() {
            stage.prepare(spec);
        }
        info!(
            "Mastering chain prepared at {}Hz, {} samples",
            spec.sample_rate, spec.max_block_size
        );
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        let flags = self.flags;
        for (key, stage) in STAGE_KEYS.iter().zip(self.stages_mut()) {
            if flags.get(key).unwrap_or(false) {
                stage.process(buffer)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for stage in self.stages_mut() {
            stage.reset();
        }
    }

    fn name(&self) -> &str {
        "Mastering Chain"
    }

    /// Dotted names: `<stage>.<parameter>` or `<stage>.enabled`
    fn parameter(&self, name: &str) -> Option<f32> {
        let (key, param) = name.split_once('.')?;
        if param == "enabled" {
            return self.flags.get(key).map(|on| if on { 1.0 } else { 0.0 });
        }
        let index = Self::stage_index(key)?;
        self.stages()[index].parameter(param)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        let Some((key, param)) = name.split_once('.') else {
            return false;
        };
        if param == "enabled" {
            return match self.flags.flag_mut(key) {
                Some(flag) => {
                    *flag = value >= 0.5;
                    true
                }
                None => false,
            };
        }
        match Self::stage_index(key) {
            Some(index) => self.stages_mut()[index].set_parameter(param, value),
            None => false,
        }
    }
}
