//! Per-track effect chains and their mode dispatch
//!
//! Each track owns an ordered DSP list, an ordered AI list and an
//! [`EffectMode`]. The [`TrackChainManager`] is owned by the audio side;
//! the control side mutates it through a [`ChainController`], whose
//! commands are drained with `try_recv` at the start of each block.
//! Effects removed on the audio side travel back over a garbage channel so
//! they are dropped off the real-time thread.
//!
//! Draining never allocates: effects arrive already prepared, each list is
//! reserved to [`MAX_EFFECTS_PER_TRACK`] up front, and cleared tracks swap
//! in empty lists allocated by the controller.

use crate::domain::ai::{AiEffect, InferenceBackend};
use crate::domain::audio::{AudioBuffer, ProcessSpec};
use crate::domain::dsp::Effect;
use arc_swap::ArcSwap;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Number of logical tracks in a session
pub const TRACK_COUNT: usize = 6;

/// Default depth of the control command queue
pub const COMMAND_QUEUE_SIZE: usize = 256;

/// Capacity reserved for each of a track's effect lists
pub const MAX_EFFECTS_PER_TRACK: usize = 16;

/// Processing mode of one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectMode {
    /// No processing
    #[default]
    Off,
    /// DSP list only
    Dsp,
    /// AI list only
    Ai,
    /// DSP list, then AI list, on the same buffer
    Hybrid,
}

impl EffectMode {
    /// Decode a host/state integer, `None` when out of range
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(EffectMode::Off),
            1 => Some(EffectMode::Dsp),
            2 => Some(EffectMode::Ai),
            3 => Some(EffectMode::Hybrid),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            EffectMode::Off => 0,
            EffectMode::Dsp => 1,
            EffectMode::Ai => 2,
            EffectMode::Hybrid => 3,
        }
    }
}

/// Logical tracks of a session, in index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Vocal,
    Bass808,
    HiHat,
    Snare,
    Piano,
    Synth,
}

impl TrackKind {
    pub const ALL: [TrackKind; TRACK_COUNT] = [
        TrackKind::Vocal,
        TrackKind::Bass808,
        TrackKind::HiHat,
        TrackKind::Snare,
        TrackKind::Piano,
        TrackKind::Synth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            TrackKind::Vocal => "Vocal",
            TrackKind::Bass808 => "808",
            TrackKind::HiHat => "HiHat",
            TrackKind::Snare => "Snare",
            TrackKind::Piano => "Piano",
            TrackKind::Synth => "Synth",
        }
    }
}

/// Which of a track's two lists an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainSlot {
    Dsp,
    Ai,
}

/// One track: a mode and two ordered effect lists
pub struct TrackChain {
    pub mode: EffectMode,
    dsp_effects: Vec<Box<dyn Effect>>,
    ai_effects: Vec<Box<dyn Effect>>,
}

impl Default for TrackChain {
    fn default() -> Self {
        Self {
            mode: EffectMode::Off,
            dsp_effects: Vec::with_capacity(MAX_EFFECTS_PER_TRACK),
            ai_effects: Vec::with_capacity(MAX_EFFECTS_PER_TRACK),
        }
    }
}

impl std::fmt::Debug for TrackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackChain")
            .field("mode", &self.mode)
            .field("dsp_effects", &self.effect_names(ChainSlot::Dsp))
            .field("ai_effects", &self.effect_names(ChainSlot::Ai))
            .finish()
    }
}

impl TrackChain {
    fn list(&self, slot: ChainSlot) -> &Vec<Box<dyn Effect>> {
        match slot {
            ChainSlot::Dsp => &self.dsp_effects,
            ChainSlot::Ai => &self.ai_effects,
        }
    }

    fn list_mut(&mut self, slot: ChainSlot) -> &mut Vec<Box<dyn Effect>> {
        match slot {
            ChainSlot::Dsp => &mut self.dsp_effects,
            ChainSlot::Ai => &mut self.ai_effects,
        }
    }

    pub fn len(&self, slot: ChainSlot) -> usize {
        self.list(slot).len()
    }

    pub fn is_empty(&self) -> bool {
        self.dsp_effects.is_empty() && self.ai_effects.is_empty()
    }

    pub fn effect_names(&self, slot: ChainSlot) -> Vec<&str> {
        self.list(slot).iter().map(|e| e.name()).collect()
    }

    pub fn effect(&self, slot: ChainSlot, index: usize) -> Option<&dyn Effect> {
        self.list(slot).get(index).map(|e| e.as_ref())
    }

    /// Push without growing the list; hands the effect back when full
    fn push(&mut self, slot: ChainSlot, effect: Box<dyn Effect>) -> Option<Box<dyn Effect>> {
        let list = self.list_mut(slot);
        if list.len() >= MAX_EFFECTS_PER_TRACK {
            return Some(effect);
        }
        list.push(effect);
        None
    }

    /// Run one list in order; a stage that rejects the block is skipped
    fn run(list: &mut [Box<dyn Effect>], buffer: &mut AudioBuffer) {
        for effect in list.iter_mut() {
            if let Err(e) = effect.process(buffer) {
                trace!("{} skipped block: {}", effect.name(), e);
            }
        }
    }

    /// Dispatch a block according to the current mode
    pub fn process(&mut self, buffer: &mut AudioBuffer) {
        match self.mode {
            EffectMode::Off => {}
            EffectMode::Dsp => Self::run(&mut self.dsp_effects, buffer),
            EffectMode::Ai => Self::run(&mut self.ai_effects, buffer),
            EffectMode::Hybrid => {
                Self::run(&mut self.dsp_effects, buffer);
                Self::run(&mut self.ai_effects, buffer);
            }
        }
    }

    fn prepare(&mut self, spec: &ProcessSpec) {
        for effect in self.dsp_effects.iter_mut().chain(self.ai_effects.iter_mut()) {
            effect.prepare(spec);
        }
    }

    fn reset(&mut self) {
        for effect in self.dsp_effects.iter_mut().chain(self.ai_effects.iter_mut()) {
            effect.reset();
        }
    }
}

/// Effects taken out of a track, to be dropped by the caller
#[derive(Default)]
pub struct RetiredEffects {
    pub dsp: Vec<Box<dyn Effect>>,
    pub ai: Vec<Box<dyn Effect>>,
}

impl RetiredEffects {
    /// Empty lists sized to replace a track's lists
    pub fn reserved() -> Self {
        Self {
            dsp: Vec::with_capacity(MAX_EFFECTS_PER_TRACK),
            ai: Vec::with_capacity(MAX_EFFECTS_PER_TRACK),
        }
    }

    pub fn len(&self) -> usize {
        self.dsp.len() + self.ai.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TRACK CHAIN MANAGER
// ============================================================================

/// Owns every track chain and dispatches blocks to them
///
/// Invalid track or effect indices are ignored: a host may address a
/// track while it is being reconfigured.
pub struct TrackChainManager {
    tracks: Vec<TrackChain>,
    spec: ProcessSpec,
}

impl Default for TrackChainManager {
    fn default() -> Self {
        Self::new(ProcessSpec::default())
    }
}

impl TrackChainManager {
    pub fn new(spec: ProcessSpec) -> Self {
        Self::with_tracks(TRACK_COUNT, spec)
    }

    pub fn with_tracks(count: usize, spec: ProcessSpec) -> Self {
        Self {
            tracks: (0..count).map(|_| TrackChain::default()).collect(),
            spec,
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn spec(&self) -> ProcessSpec {
        self.spec
    }

    pub fn track(&self, track: usize) -> Option<&TrackChain> {
        self.tracks.get(track)
    }

    /// Prepare every effect on every track
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = *spec;
        for chain in &mut self.tracks {
            chain.prepare(spec);
        }
        debug!(
            "Prepared {} tracks at {} Hz, block {}",
            self.tracks.len(),
            spec.sample_rate,
            spec.max_block_size
        );
    }

    pub fn set_mode(&mut self, track: usize, mode: EffectMode) {
        if let Some(chain) = self.tracks.get_mut(track) {
            chain.mode = mode;
            trace!("Track {} mode {:?}", track, mode);
        }
    }

    pub fn mode(&self, track: usize) -> Option<EffectMode> {
        self.tracks.get(track).map(|c| c.mode)
    }

    pub fn modes(&self) -> Vec<EffectMode> {
        self.tracks.iter().map(|c| c.mode).collect()
    }

    /// Append an effect to one list, preparing it with the current spec
    ///
    /// Not for the audio thread, `prepare` may allocate. Returns the effect
    /// back when the track does not exist or the list is full.
    pub fn add_effect(
        &mut self,
        track: usize,
        slot: ChainSlot,
        mut effect: Box<dyn Effect>,
    ) -> Option<Box<dyn Effect>> {
        let spec = self.spec;
        match self.tracks.get_mut(track) {
            Some(chain) => {
                effect.prepare(&spec);
                chain.push(slot, effect)
            }
            None => Some(effect),
        }
    }

    /// Append an effect already prepared with `prepared_with`
    ///
    /// Never prepares or grows a list. The effect comes back when the track
    /// does not exist, the list is full or the spec has changed since.
    pub fn insert_prepared(
        &mut self,
        track: usize,
        slot: ChainSlot,
        effect: Box<dyn Effect>,
        prepared_with: &ProcessSpec,
    ) -> Option<Box<dyn Effect>> {
        if *prepared_with != self.spec {
            trace!("{} prepared for a stale spec", effect.name());
            return Some(effect);
        }
        match self.tracks.get_mut(track) {
            Some(chain) => chain.push(slot, effect),
            None => Some(effect),
        }
    }

    pub fn add_dsp_effect(&mut self, track: usize, effect: Box<dyn Effect>) {
        self.add_effect(track, ChainSlot::Dsp, effect);
    }

    pub fn add_ai_effect(&mut self, track: usize, effect: Box<dyn Effect>) {
        self.add_effect(track, ChainSlot::Ai, effect);
    }

    /// Append an inference effect for `role` to a track's AI list
    pub fn add_inference_effect(
        &mut self,
        track: usize,
        role: &str,
        backend: Arc<dyn InferenceBackend>,
    ) {
        self.add_ai_effect(track, Box::new(AiEffect::new(role, backend)));
    }

    /// Empty both lists of a track
    pub fn clear_effects(&mut self, track: usize) -> RetiredEffects {
        self.swap_effects(track, RetiredEffects::reserved())
    }

    /// Swap a track's lists for `spare`, returning the old ones
    ///
    /// `spare` comes straight back for unknown tracks.
    pub fn swap_effects(&mut self, track: usize, mut spare: RetiredEffects) -> RetiredEffects {
        spare.dsp.clear();
        spare.ai.clear();
        if let Some(chain) = self.tracks.get_mut(track) {
            std::mem::swap(&mut chain.dsp_effects, &mut spare.dsp);
            std::mem::swap(&mut chain.ai_effects, &mut spare.ai);
        }
        spare
    }

    /// Set a named parameter on one effect
    ///
    /// Returns false for unknown tracks, indices or parameter names.
    pub fn set_effect_parameter(
        &mut self,
        track: usize,
        slot: ChainSlot,
        index: usize,
        name: &str,
        value: f32,
    ) -> bool {
        self.tracks
            .get_mut(track)
            .and_then(|chain| chain.list_mut(slot).get_mut(index))
            .map(|effect| effect.set_parameter(name, value))
            .unwrap_or(false)
    }

    pub fn effect_parameter(
        &self,
        track: usize,
        slot: ChainSlot,
        index: usize,
        name: &str,
    ) -> Option<f32> {
        self.tracks
            .get(track)
            .and_then(|chain| chain.effect(slot, index))
            .and_then(|effect| effect.parameter(name))
    }

    /// Process one track's block in place according to its mode
    pub fn process(&mut self, buffer: &mut AudioBuffer, track: usize) {
        if let Some(chain) = self.tracks.get_mut(track) {
            chain.process(buffer);
        }
    }

    pub fn reset(&mut self) {
        for chain in &mut self.tracks {
            chain.reset();
        }
    }

    /// Apply every queued control command without blocking
    ///
    /// Each command retires at most one item, so draining stops while the
    /// garbage queue is full and resumes once the controller collects.
    /// Returns the number of commands applied.
    pub fn drain_commands(&mut self, receiver: &ChainReceiver) -> usize {
        let mut applied = 0;
        loop {
            if receiver.garbage.is_full() {
                if !receiver.commands.is_empty() {
                    receiver.stalls.fetch_add(1, Ordering::Relaxed);
                    trace!("Garbage queue full, {} commands deferred", receiver.commands.len());
                }
                break;
            }
            match receiver.commands.try_recv() {
                Ok(command) => {
                    self.apply(command, receiver);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    fn apply(&mut self, command: ChainCommand, receiver: &ChainReceiver) {
        match command {
            ChainCommand::SetMode { track, mode } => self.set_mode(track, mode),
            ChainCommand::AddEffect {
                track,
                slot,
                effect,
                prepared_with,
            } => {
                if let Some(rejected) = self.insert_prepared(track, slot, effect, &prepared_with) {
                    receiver.retire(Garbage::Effect(rejected));
                }
            }
            ChainCommand::Clear { track, spare } => {
                let retired = self.swap_effects(track, spare);
                receiver.retire(Garbage::Effects(retired));
            }
            ChainCommand::SetParameter {
                track,
                slot,
                index,
                name,
                value,
            } => {
                self.set_effect_parameter(track, slot, index, &name, value);
                receiver.retire(Garbage::Name(name));
            }
        }
    }
}

impl std::fmt::Debug for TrackChainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackChainManager")
            .field("spec", &self.spec)
            .field("tracks", &self.tracks)
            .finish()
    }
}

// ============================================================================
// CONTROL CHANNEL
// ============================================================================

/// Errors sending a control command
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChainError {
    #[error("Command queue is full")]
    QueueFull,

    #[error("Audio side has been dropped")]
    Disconnected,
}

/// Configuration change for the audio side
pub enum ChainCommand {
    SetMode {
        track: usize,
        mode: EffectMode,
    },
    AddEffect {
        track: usize,
        slot: ChainSlot,
        effect: Box<dyn Effect>,
        prepared_with: ProcessSpec,
    },
    Clear {
        track: usize,
        spare: RetiredEffects,
    },
    SetParameter {
        track: usize,
        slot: ChainSlot,
        index: usize,
        name: String,
        value: f32,
    },
}

/// Allocations handed back to the control side for dropping
pub enum Garbage {
    Effect(Box<dyn Effect>),
    Effects(RetiredEffects),
    Name(String),
}

/// Control-side handle: sends commands, collects retired effects
pub struct ChainController {
    commands: Sender<ChainCommand>,
    garbage: Receiver<Garbage>,
    spec: Arc<ArcSwap<ProcessSpec>>,
    stalls: Arc<AtomicUsize>,
}

/// Audio-side end of the control channel
pub struct ChainReceiver {
    commands: Receiver<ChainCommand>,
    garbage: Sender<Garbage>,
    spec: Arc<ArcSwap<ProcessSpec>>,
    stalls: Arc<AtomicUsize>,
}

/// Create a connected controller/receiver pair
pub fn control_channel(spec: ProcessSpec, capacity: usize) -> (ChainController, ChainReceiver) {
    let (command_tx, command_rx) = bounded(capacity);
    let (garbage_tx, garbage_rx) = bounded(capacity);
    let spec = Arc::new(ArcSwap::from_pointee(spec));
    let stalls = Arc::new(AtomicUsize::new(0));
    (
        ChainController {
            commands: command_tx,
            garbage: garbage_rx,
            spec: Arc::clone(&spec),
            stalls: Arc::clone(&stalls),
        },
        ChainReceiver {
            commands: command_rx,
            garbage: garbage_tx,
            spec,
            stalls,
        },
    )
}

impl ChainReceiver {
    /// Publish the spec the audio side is now prepared with
    pub fn publish_spec(&self, spec: ProcessSpec) {
        self.spec.store(Arc::new(spec));
    }

    /// Hand an item back to the control side
    ///
    /// The drain loop keeps a free slot, so only a dropped controller
    /// leaves the item to be freed here.
    fn retire(&self, garbage: Garbage) {
        if let Err(e) = self.garbage.try_send(garbage) {
            trace!("Retired item freed on the audio side: {}", e);
        }
    }
}

impl ChainController {
    /// Spec most recently published by the audio side
    pub fn spec(&self) -> ProcessSpec {
        **self.spec.load()
    }

    fn send(&self, command: ChainCommand) -> Result<(), ChainError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ChainError::QueueFull,
            TrySendError::Disconnected(_) => ChainError::Disconnected,
        })
    }

    pub fn set_mode(&self, track: usize, mode: EffectMode) -> Result<(), ChainError> {
        self.send(ChainCommand::SetMode { track, mode })
    }

    /// Prepare `effect` here, then queue it for the audio side
    ///
    /// The audio side refuses an effect prepared for a spec it no longer
    /// runs at and returns it through the garbage queue.
    pub fn add_effect(
        &self,
        track: usize,
        slot: ChainSlot,
        mut effect: Box<dyn Effect>,
    ) -> Result<(), ChainError> {
        let prepared_with = self.spec();
        effect.prepare(&prepared_with);
        debug!("Queueing {} for track {} ({:?})", effect.name(), track, slot);
        self.send(ChainCommand::AddEffect {
            track,
            slot,
            effect,
            prepared_with,
        })
    }

    pub fn add_dsp_effect(&self, track: usize, effect: Box<dyn Effect>) -> Result<(), ChainError> {
        self.add_effect(track, ChainSlot::Dsp, effect)
    }

    pub fn add_ai_effect(&self, track: usize, effect: Box<dyn Effect>) -> Result<(), ChainError> {
        self.add_effect(track, ChainSlot::Ai, effect)
    }

    pub fn clear_effects(&self, track: usize) -> Result<(), ChainError> {
        self.send(ChainCommand::Clear {
            track,
            spare: RetiredEffects::reserved(),
        })
    }

    pub fn set_effect_parameter(
        &self,
        track: usize,
        slot: ChainSlot,
        index: usize,
        name: &str,
        value: f32,
    ) -> Result<(), ChainError> {
        self.send(ChainCommand::SetParameter {
            track,
            slot,
            index,
            name: name.to_string(),
            value,
        })
    }

    /// Drop everything the audio side has retired, returning the count
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        while let Ok(garbage) = self.garbage.try_recv() {
            if let Garbage::Effects(retired) = &garbage {
                trace!("Dropping {} retired effects", retired.len());
            }
            drop(garbage);
            collected += 1;
        }
        collected
    }

    /// Times the audio side deferred commands on a full garbage queue
    pub fn stalled_drains(&self) -> usize {
        self.stalls.load(Ordering::Relaxed)
    }
}
