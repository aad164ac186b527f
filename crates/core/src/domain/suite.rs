//! Vocal FX suite
//!
//! Fixed-order vocal chain with per-stage enable flags, A/B comparison,
//! input/output metering and in-memory enable-flag presets.

use crate::domain::ai::{AiEffect, InferenceBackend};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use crate::domain::dsp::{
    prepared_spec, DeEsser, Effect, Limiter, MultibandCompressor, Result, Saturator,
    SpaceReverb, StereoImager, TransientShaper, VocalTimbre, VocalTimbreParams,
};
use crate::domain::metering::{estimate_pitch, Meters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Inference role that renders pitch correction and harmony voices
pub const PITCH_HARMONY_ROLE: &str = "pitch-harmony";

// ============================================================================
// VOCAL CLONE
// ============================================================================

/// Timbre shaping followed by the optional pitch/harmony inference role
///
/// The DSP timbre path always runs. The inference role only runs when
/// pitch correction or harmony is requested and a backend is attached;
/// it passes through while its model is not ready.
#[derive(Debug)]
pub struct VocalClone {
    timbre: VocalTimbre,
    pitch: Option<AiEffect>,
    spec: Option<ProcessSpec>,
}

impl Default for VocalClone {
    fn default() -> Self {
        Self::new(VocalTimbreParams::default())
    }
}

impl VocalClone {
    pub fn new(params: VocalTimbreParams) -> Self {
        Self {
            timbre: VocalTimbre::new(params),
            pitch: None,
            spec: None,
        }
    }

    /// Route pitch and harmony work to `backend`
    pub fn attach_backend(&mut self, backend: Arc<dyn InferenceBackend>) {
        let mut effect = AiEffect::new(PITCH_HARMONY_ROLE, backend);
        if let Some(spec) = self.spec {
            effect.prepare(&spec);
        }
        self.pitch = Some(effect);
    }

    pub fn has_backend(&self) -> bool {
        self.pitch.is_some()
    }

    pub fn timbre(&self) -> &VocalTimbre {
        &self.timbre
    }

    pub fn timbre_mut(&mut self) -> &mut VocalTimbre {
        &mut self.timbre
    }
}

impl Effect for VocalClone {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.timbre.prepare(spec);
        if let Some(pitch) = &mut self.pitch {
            pitch.prepare(spec);
        }
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        self.timbre.process(buffer)?;
        if self.timbre.needs_pitch_processing() {
            if let Some(pitch) = &mut self.pitch {
                pitch.process(buffer)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.timbre.reset();
        if let Some(pitch) = &mut self.pitch {
            pitch.reset();
        }
    }

    fn name(&self) -> &str {
        self.timbre.name()
    }

    fn parameter(&self, name: &str) -> Option<f32> {
        self.timbre.parameter(name)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        self.timbre.set_parameter(name, value)
    }
}

// ============================================================================
// SUITE STATE
// ============================================================================

/// Enable flags of the suite, the unit of state save/restore and presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteState {
    pub multiband: bool,
    pub transient_shaper: bool,
    pub deesser: bool,
    pub saturation: bool,
    pub stereo_widener: bool,
    pub vocal_clone: bool,
    pub space_reverb: bool,
    pub limiter: bool,
}

impl Default for SuiteState {
    fn default() -> Self {
        Self {
            multiband: true,
            transient_shaper: false,
            deesser: true,
            saturation: false,
            stereo_widener: true,
            vocal_clone: false,
            space_reverb: true,
            limiter: true,
        }
    }
}

impl SuiteState {
    /// Stage keys in processing order; each names its enable flag
    pub const KEYS: [&'static str; 8] = [
        "multiband",
        "transient_shaper",
        "deesser",
        "saturation",
        "stereo_widener",
        "vocal_clone",
        "space_reverb",
        "limiter",
    ];

    fn flag_mut(&mut self, key: &str) -> Option<&mut bool> {
        Some(match key {
            "multiband" => &mut self.multiband,
            "transient_shaper" => &mut self.transient_shaper,
            "deesser" => &mut self.deesser,
            "saturation" => &mut self.saturation,
            "stereo_widener" => &mut self.stereo_widener,
            "vocal_clone" => &mut self.vocal_clone,
            "space_reverb" => &mut self.space_reverb,
            "limiter" => &mut self.limiter,
            _ => return None,
        })
    }
}

/// Partial state: absent keys keep their current value on restore
#[derive(Debug, Default, Deserialize)]
struct SuiteStatePatch {
    multiband: Option<bool>,
    transient_shaper: Option<bool>,
    deesser: Option<bool>,
    saturation: Option<bool>,
    stereo_widener: Option<bool>,
    vocal_clone: Option<bool>,
    space_reverb: Option<bool>,
    limiter: Option<bool>,
}

impl SuiteStatePatch {
    fn apply(self, state: &mut SuiteState) {
        let fields = [
            (self.multiband, &mut state.multiband),
            (self.transient_shaper, &mut state.transient_shaper),
            (self.deesser, &mut state.deesser),
            (self.saturation, &mut state.saturation),
            (self.stereo_widener, &mut state.stereo_widener),
            (self.vocal_clone, &mut state.vocal_clone),
            (self.space_reverb, &mut state.space_reverb),
            (self.limiter, &mut state.limiter),
        ];
        for (value, flag) in fields {
            if let Some(value) = value {
                *flag = value;
            }
        }
    }
}

/// A/B comparison switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbCompare {
    pub enabled: bool,
    /// When false (and enabled) blocks pass through unprocessed
    pub show_processed: bool,
}

impl Default for AbCompare {
    fn default() -> Self {
        Self {
            enabled: false,
            show_processed: true,
        }
    }
}

// ============================================================================
// FX SUITE
// ============================================================================

/// Fixed-order vocal chain
///
/// multiband → transient shaper → de-esser → saturation → stereo widener →
/// vocal clone → space reverb → limiter
#[derive(Debug)]
pub struct FxSuite {
    state: SuiteState,
    ab: AbCompare,
    spec: Option<ProcessSpec>,
    multiband: MultibandCompressor,
    transient: TransientShaper,
    deesser: DeEsser,
    saturation: Saturator,
    widener: StereoImager,
    vocal: VocalClone,
    reverb: SpaceReverb,
    limiter: Limiter,
    meters: Arc<Meters>,
    presets: BTreeMap<String, SuiteState>,
}

impl Default for FxSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl FxSuite {
    pub fn new() -> Self {
        Self {
            state: SuiteState::default(),
            ab: AbCompare::default(),
            spec: None,
            multiband: MultibandCompressor::default(),
            transient: TransientShaper::default(),
            deesser: DeEsser::default(),
            saturation: Saturator::default(),
            widener: StereoImager::widener(),
            vocal: VocalClone::default(),
            reverb: SpaceReverb::default(),
            limiter: Limiter::default(),
            meters: Arc::new(Meters::new()),
            presets: BTreeMap::new(),
        }
    }

    /// Shared handle to the suite meters
    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn set_state(&mut self, state: SuiteState) {
        self.state = state;
    }

    pub fn ab_compare(&self) -> AbCompare {
        self.ab
    }

    pub fn set_ab_compare(&mut self, ab: AbCompare) {
        self.ab = ab;
        trace!(
            "A/B compare {} showing {}",
            if ab.enabled { "on" } else { "off" },
            if ab.show_processed { "processed" } else { "original" }
        );
    }

    /// Serialise the enable flags for host state save
    pub fn state_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.state)
    }

    /// Restore enable flags from JSON; keys that are absent stay as they are
    pub fn restore_json(&mut self, json: &str) -> serde_json::Result<()> {
        let patch: SuiteStatePatch = serde_json::from_str(json)?;
        patch.apply(&mut self.state);
        debug!("Suite state restored: {:?}", self.state);
        Ok(())
    }

    /// Store the current enable flags under `name`, replacing any previous one
    pub fn save_preset(&mut self, name: impl Into<String>) {
        let name = name.into();
        info!("Suite preset saved: {}", name);
        self.presets.insert(name, self.state);
    }

    /// Recall a stored preset, returning whether it existed
    pub fn load_preset(&mut self, name: &str) -> bool {
        match self.presets.get(name) {
            Some(state) => {
                self.state = *state;
                info!("Suite preset loaded: {}", name);
                true
            }
            None => false,
        }
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn multiband_mut(&mut self) -> &mut MultibandCompressor {
        &mut self.multiband
    }

    pub fn transient_mut(&mut self) -> &mut TransientShaper {
        &mut self.transient
    }

    pub fn deesser_mut(&mut self) -> &mut DeEsser {
        &mut self.deesser
    }

    pub fn saturation_mut(&mut self) -> &mut Saturator {
        &mut self.saturation
    }

    pub fn widener_mut(&mut self) -> &mut StereoImager {
        &mut self.widener
    }

    pub fn vocal_clone_mut(&mut self) -> &mut VocalClone {
        &mut self.vocal
    }

    pub fn reverb_mut(&mut self) -> &mut SpaceReverb {
        &mut self.reverb
    }

    pub fn limiter_mut(&mut self) -> &mut Limiter {
        &mut self.limiter
    }

    fn stage(&self, key: &str) -> Option<&dyn Effect> {
        Some(match key {
            "multiband" => &self.multiband,
            "transient_shaper" => &self.transient,
            "deesser" => &self.deesser,
            "saturation" => &self.saturation,
            "stereo_widener" => &self.widener,
            "vocal_clone" => &self.vocal,
            "space_reverb" => &self.reverb,
            "limiter" => &self.limiter,
            _ => return None,
        })
    }

    fn stages_mut(&mut self) -> [(bool, &mut dyn Effect); 8] {
        let s = self.state;
        [
            (s.multiband, &mut self.multiband),
            (s.transient_shaper, &mut self.transient),
            (s.deesser, &mut self.deesser),
            (s.saturation, &mut self.saturation),
            (s.stereo_widener, &mut self.widener),
            (s.vocal_clone, &mut self.vocal),
            (s.space_reverb, &mut self.reverb),
            (s.limiter, &mut self.limiter),
        ]
    }
}

impl Effect for FxSuite {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        for (_, stage) in self.stages_mut() {
            stage.prepare(spec);
        }
        debug!("FX suite prepared at {}Hz", spec.sample_rate);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let spec = prepared_spec(&self.spec, buffer)?;
        self.meters.input.update(buffer);
        self.meters
            .set_pitch(estimate_pitch(buffer, spec.sample_rate));

        if self.ab.enabled && !self.ab.show_processed {
            self.meters.output.update(buffer);
            return Ok(());
        }

        for (enabled, stage) in self.stages_mut() {
            if enabled {
                stage.process(buffer)?;
            }
        }

        self.meters.output.update(buffer);
        Ok(())
    }

    fn reset(&mut self) {
        for (_, stage) in self.stages_mut() {
            stage.reset();
        }
        self.meters.reset();
    }

    fn name(&self) -> &str {
        "FX Suite"
    }

    /// Dotted names: `<stage>.<parameter>` or `<stage>.enabled`
    fn parameter(&self, name: &str) -> Option<f32> {
        let (key, param) = name.split_once('.')?;
        if param == "enabled" {
            let mut state = self.state;
            return state.flag_mut(key).map(|on| if *on { 1.0 } else { 0.0 });
        }
        self.stage(key)?.parameter(param)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        let Some((key, param)) = name.split_once('.') else {
            return false;
        };
        if param == "enabled" {
            return match self.state.flag_mut(key) {
                Some(flag) => {
                    *flag = value >= 0.5;
                    true
                }
                None => false,
            };
        }
        let Some(index) = SuiteState::KEYS.iter().position(|k| *k == key) else {
            return false;
        };
        match self.stages_mut().into_iter().nth(index) {
            Some((_, stage)) => stage.set_parameter(param, value),
            None => false,
        }
    }
}
