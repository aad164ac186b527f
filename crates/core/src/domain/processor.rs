//! Session-level block processor
//!
//! Ties the per-track chains, the mastering chain and the meters together
//! and tracks the host transport.

use crate::domain::audio::{AudioBuffer, AudioError, ProcessSpec};
use crate::domain::chain::{
    control_channel, ChainController, ChainReceiver, EffectMode, TrackChainManager,
    COMMAND_QUEUE_SIZE,
};
use crate::domain::dsp::{prepared_spec, Effect, Result};
use crate::domain::mastering::MasteringChain;
use crate::domain::metering::Meters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Tempo assumed until the host reports one
pub const DEFAULT_BPM: f64 = 120.0;

/// Smallest tempo change that is applied
const BPM_EPSILON: f64 = 0.1;

/// Host transport as seen at the start of a block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub is_playing: bool,
    pub position_seconds: f64,
    /// Zero or negative when the host does not know the tempo
    pub bpm: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            is_playing: false,
            position_seconds: 0.0,
            bpm: DEFAULT_BPM,
        }
    }
}

/// Host-restorable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub bpm: f64,
    pub enhancer_enabled: bool,
    /// One mode index per track, see [`EffectMode::from_index`]
    pub fx_modes: Vec<u8>,
}

/// Partial state: absent keys leave the session unchanged
#[derive(Debug, Default, Deserialize)]
struct SessionStatePatch {
    bpm: Option<f64>,
    enhancer_enabled: Option<bool>,
    fx_modes: Option<Vec<i64>>,
}

/// Owns everything that runs inside the audio callback
pub struct SessionProcessor {
    spec: Option<ProcessSpec>,
    chains: TrackChainManager,
    receiver: ChainReceiver,
    mastering: MasteringChain,
    enhancer_enabled: bool,
    meters: Arc<Meters>,
    transport: Transport,
}

impl std::fmt::Debug for SessionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProcessor")
            .field("spec", &self.spec)
            .field("chains", &self.chains)
            .field("enhancer_enabled", &self.enhancer_enabled)
            .field("transport", &self.transport)
            .finish()
    }
}

impl SessionProcessor {
    /// Create a processor and the controller that reconfigures it
    pub fn new(spec: ProcessSpec) -> (Self, ChainController) {
        let (controller, receiver) = control_channel(spec, COMMAND_QUEUE_SIZE);
        let processor = Self {
            spec: None,
            chains: TrackChainManager::new(spec),
            receiver,
            mastering: MasteringChain::new(),
            enhancer_enabled: true,
            meters: Arc::new(Meters::new()),
            transport: Transport::default(),
        };
        (processor, controller)
    }

    /// Prepare every chain for `spec`
    ///
    /// Call from the control side before audio starts, or whenever the
    /// sample rate or block size changes while audio is stopped.
    pub fn prepare(&mut self, spec: &ProcessSpec) -> std::result::Result<(), AudioError> {
        spec.validate()?;
        self.chains.prepare(spec);
        self.mastering.prepare(spec);
        self.receiver.publish_spec(*spec);
        self.spec = Some(*spec);
        info!(
            "Session prepared: {}Hz, {} samples, {} channels",
            spec.sample_rate, spec.max_block_size, spec.channels
        );
        Ok(())
    }

    /// Process one host block in place
    ///
    /// Queued control commands are applied first, then every track whose
    /// mode is not Off, then the mastering chain. A rejected block is left
    /// untouched.
    pub fn process_block(&mut self, buffer: &mut AudioBuffer, transport: Transport) -> Result<()> {
        prepared_spec(&self.spec, buffer)?;
        self.update_transport(transport);

        let applied = self.chains.drain_commands(&self.receiver);
        if applied > 0 {
            trace!("Applied {} control commands", applied);
        }

        self.meters.input.update(buffer);
        for track in 0..self.chains.num_tracks() {
            if self.chains.mode(track) != Some(EffectMode::Off) {
                self.chains.process(buffer, track);
            }
        }

        if self.enhancer_enabled {
            if let Err(e) = self.mastering.process(buffer) {
                trace!("Mastering skipped block: {}", e);
            }
            self.meters.set_loudness(self.mastering.current_loudness());
        }
        self.meters.output.update(buffer);
        Ok(())
    }

    fn update_transport(&mut self, transport: Transport) {
        self.transport.is_playing = transport.is_playing;
        self.transport.position_seconds = transport.position_seconds;
        if transport.bpm > 0.0 && (transport.bpm - self.transport.bpm).abs() > BPM_EPSILON {
            self.set_bpm(transport.bpm);
        }
    }

    /// Set the session tempo; the mastering echo follows it
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 {
            self.transport.bpm = bpm;
            self.mastering.sync_delay_to_bpm(bpm);
            debug!("Session tempo {:.1} BPM", bpm);
        }
    }

    pub fn bpm(&self) -> f64 {
        self.transport.bpm
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn set_enhancer_enabled(&mut self, enabled: bool) {
        self.enhancer_enabled = enabled;
    }

    pub fn enhancer_enabled(&self) -> bool {
        self.enhancer_enabled
    }

    pub fn chains(&self) -> &TrackChainManager {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut TrackChainManager {
        &mut self.chains
    }

    pub fn mastering(&self) -> &MasteringChain {
        &self.mastering
    }

    pub fn mastering_mut(&mut self) -> &mut MasteringChain {
        &mut self.mastering
    }

    /// Shared handle to the session meters
    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }

    /// Clear all processing history, e.g. on transport stop
    pub fn reset(&mut self) {
        self.chains.reset();
        self.mastering.reset();
        self.meters.reset();
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            bpm: self.transport.bpm,
            enhancer_enabled: self.enhancer_enabled,
            fx_modes: self.chains.modes().into_iter().map(EffectMode::index).collect(),
        }
    }

    /// Restore a saved state; unknown modes and extra tracks are ignored
    pub fn set_state(&mut self, state: &SessionState) {
        self.set_bpm(state.bpm);
        self.enhancer_enabled = state.enhancer_enabled;
        self.apply_modes(state.fx_modes.iter().map(|&m| m as i64));
    }

    fn apply_modes(&mut self, modes: impl Iterator<Item = i64>) {
        for (track, mode) in modes.take(self.chains.num_tracks()).enumerate() {
            match u8::try_from(mode).ok().and_then(EffectMode::from_index) {
                Some(mode) => self.chains.set_mode(track, mode),
                None => debug!("Ignoring invalid mode {} for track {}", mode, track),
            }
        }
    }

    pub fn state_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.state())
    }

    /// Restore from JSON; keys that are absent keep their current values
    pub fn restore_json(&mut self, json: &str) -> serde_json::Result<()> {
        let patch: SessionStatePatch = serde_json::from_str(json)?;
        if let Some(bpm) = patch.bpm {
            self.set_bpm(bpm);
        }
        if let Some(enabled) = patch.enhancer_enabled {
            self.enhancer_enabled = enabled;
        }
        if let Some(modes) = patch.fx_modes {
            self.apply_modes(modes.into_iter());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::TRACK_COUNT;
    use crate::domain::dsp::test_util::*;
    use crate::domain::dsp::Result as DspResult;

    /// Multiplies every sample by a fixed gain
    struct Gain(f32);

    impl Effect for Gain {
        fn prepare(&mut self, _spec: &ProcessSpec) {}

        fn process(&mut self, buffer: &mut AudioBuffer) -> DspResult<()> {
            buffer.apply_gain(self.0);
            Ok(())
        }

        fn reset(&mut self) {}

        fn name(&self) -> &str {
            "Gain"
        }
    }

    fn prepared() -> (SessionProcessor, ChainController) {
        let (mut processor, controller) = SessionProcessor::new(spec());
        processor.prepare(&spec()).unwrap();
        (processor, controller)
    }

    // ------------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------------

    #[test]
    fn test_all_off_without_enhancer_is_identity() {
        let (mut processor, _controller) = prepared();
        processor.set_enhancer_enabled(false);

        let input = stereo_sine(BLOCK, 440.0, 0.5);
        let mut output = input.clone();
        processor
            .process_block(&mut output, Transport::default())
            .unwrap();
        assert_eq!(input, output);

        let snapshot = processor.meters().snapshot();
        assert!((snapshot.input_rms - snapshot.output_rms).abs() < 1e-6);
    }

    #[test]
    fn test_only_active_tracks_run() {
        let (mut processor, controller) = prepared();
        processor.set_enhancer_enabled(false);
        controller.add_dsp_effect(0, Box::new(Gain(0.5))).unwrap();
        controller.add_dsp_effect(1, Box::new(Gain(0.5))).unwrap();
        controller.set_mode(0, EffectMode::Dsp).unwrap();

        let mut block = stereo_sine(BLOCK, 440.0, 0.8);
        let peak = block.peak();
        processor
            .process_block(&mut block, Transport::default())
            .unwrap();
        assert!((block.peak() - peak * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unprepared_block_is_rejected() {
        let (mut processor, _controller) = SessionProcessor::new(spec());
        let input = stereo_sine(BLOCK, 440.0, 0.5);
        let mut output = input.clone();
        assert!(processor
            .process_block(&mut output, Transport::default())
            .is_err());
        assert_eq!(input, output);
    }

    #[test]
    fn test_invalid_spec_is_refused() {
        let (mut processor, _controller) = SessionProcessor::new(spec());
        assert!(processor
            .prepare(&ProcessSpec::new(0.0, BLOCK, 2))
            .is_err());
    }

    #[test]
    fn test_enhancer_publishes_loudness() {
        let (mut processor, _controller) = prepared();
        let mut block = stereo_sine(BLOCK, 440.0, 0.5);
        processor
            .process_block(&mut block, Transport::default())
            .unwrap();
        assert_eq!(processor.meters().snapshot().loudness_db, -24.0);
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    #[test]
    fn test_bpm_threshold() {
        let (mut processor, _controller) = prepared();
        let mut block = silence(BLOCK);
        let mut transport = Transport {
            is_playing: true,
            position_seconds: 1.5,
            bpm: 120.05,
        };
        processor.process_block(&mut block, transport).unwrap();
        assert_eq!(processor.bpm(), 120.0);
        assert!(processor.transport().is_playing);
        assert_eq!(processor.transport().position_seconds, 1.5);

        transport.bpm = 0.0;
        processor.process_block(&mut block, transport).unwrap();
        assert_eq!(processor.bpm(), 120.0);

        transport.bpm = 96.0;
        processor.process_block(&mut block, transport).unwrap();
        assert_eq!(processor.bpm(), 96.0);
        assert_eq!(processor.mastering().params().delay_ms, 625.0);
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    #[test]
    fn test_state_round_trip() {
        let (mut processor, _controller) = prepared();
        processor.chains_mut().set_mode(2, EffectMode::Hybrid);
        processor.set_enhancer_enabled(false);
        processor.set_bpm(140.0);

        let json = processor.state_json().unwrap();
        let (mut restored, _c) = prepared();
        restored.restore_json(&json).unwrap();
        assert_eq!(restored.state(), processor.state());
        assert_eq!(restored.state().fx_modes.len(), TRACK_COUNT);
    }

    #[test]
    fn test_restore_ignores_invalid_modes() {
        let (mut processor, _controller) = prepared();
        processor
            .restore_json(r#"{"fx_modes": [1, 9, -1, 3, 0, 2, 3, 3]}"#)
            .unwrap();
        let modes = processor.chains().modes();
        assert_eq!(modes[0], EffectMode::Dsp);
        assert_eq!(modes[1], EffectMode::Off);
        assert_eq!(modes[2], EffectMode::Off);
        assert_eq!(modes[3], EffectMode::Hybrid);
        assert_eq!(modes[5], EffectMode::Ai);
        assert_eq!(processor.bpm(), DEFAULT_BPM);
        assert!(processor.enhancer_enabled());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut processor, _controller) = prepared();
        let mut block = stereo_sine(BLOCK, 440.0, 0.5);
        processor
            .process_block(&mut block, Transport::default())
            .unwrap();
        processor.reset();
        processor.reset();

        let mut quiet = silence(BLOCK);
        processor
            .process_block(&mut quiet, Transport::default())
            .unwrap();
        assert!(quiet.peak() < 1e-6);
        assert_eq!(processor.meters().snapshot().input_rms, 0.0);
    }
}
