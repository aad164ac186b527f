//! End-to-end behaviour of chains, the session and the model registry

use crate::signals::{silence, spec, stereo_sine, BLOCK};
use cadenza_core::domain::dsp::{
    Effect, LoudnessNormalizer, LoudnessNormalizerParams, Result,
};
use cadenza_core::domain::{
    gain_to_db, AiEffect, AudioBuffer, ChainSlot, EffectKind, EffectMode, InferenceBackend,
    NoBackend, ProcessSpec, SessionProcessor, TrackChainManager, TrackKind, Transport,
};
use cadenza_infra::{KernelModel, ModelRegistry};
use std::sync::{Arc, Mutex};

/// Records its name, then scales the block
struct Marker {
    name: &'static str,
    gain: f32,
    log: Arc<Mutex<Vec<(&'static str, f32)>>>,
}

impl Effect for Marker {
    fn prepare(&mut self, _spec: &ProcessSpec) {}

    fn process(&mut self, buffer: &mut AudioBuffer) -> Result<()> {
        let first = buffer.channel(0).first().copied().unwrap_or(0.0);
        self.log.lock().unwrap().push((self.name, first));
        buffer.apply_gain(self.gain);
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        self.name
    }
}

fn constant_block(value: f32) -> AudioBuffer {
    AudioBuffer::from_channels(vec![vec![value; 64], vec![value; 64]])
}

// ============================================================================
// MODE DISPATCH
// ============================================================================

#[test]
fn test_hybrid_feeds_dsp_output_into_ai() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chains = TrackChainManager::new(spec());
    chains.prepare(&spec());

    let marker = |name, gain| {
        Box::new(Marker {
            name,
            gain,
            log: Arc::clone(&log),
        })
    };
    chains.add_dsp_effect(0, marker("dsp-a", 2.0));
    chains.add_dsp_effect(0, marker("dsp-b", 3.0));
    chains.add_ai_effect(0, marker("ai", 1.0));
    chains.set_mode(0, EffectMode::Hybrid);

    let mut block = constant_block(0.1);
    chains.process(&mut block, 0);

    let calls = log.lock().unwrap().clone();
    let names: Vec<_> = calls.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["dsp-a", "dsp-b", "ai"]);
    // The AI list sees exactly what the DSP list produced
    assert!((calls[2].1 - 0.6).abs() < 1e-6);
    assert!((block.channel(1)[10] - 0.6).abs() < 1e-6);
}

#[test]
fn test_off_mode_leaves_block_untouched() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chains = TrackChainManager::new(spec());
    chains.add_dsp_effect(
        0,
        Box::new(Marker {
            name: "dsp",
            gain: 0.0,
            log: Arc::clone(&log),
        }),
    );
    chains.set_mode(0, EffectMode::Off);

    let input = stereo_sine(BLOCK, 440.0, 0.5);
    let mut block = input.clone();
    chains.process(&mut block, 0);
    assert_eq!(block, input);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_invalid_track_is_ignored() {
    let mut chains = TrackChainManager::new(spec());
    let input = stereo_sine(BLOCK, 440.0, 0.5);
    let mut block = input.clone();
    chains.set_mode(99, EffectMode::Dsp);
    chains.process(&mut block, 99);
    assert_eq!(block, input);
}

// ============================================================================
// AI BRIDGE
// ============================================================================

#[test]
fn test_not_ready_backend_passes_through() {
    let mut effect = AiEffect::new("vocal-clarity", Arc::new(NoBackend));
    effect.prepare(&spec());

    let input = stereo_sine(BLOCK, 220.0, 0.7);
    let mut block = input.clone();
    effect.process(&mut block).unwrap();

    let before: Vec<u32> = input.channels().flatten().map(|s| s.to_bits()).collect();
    let after: Vec<u32> = block.channels().flatten().map(|s| s.to_bits()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_registry_drives_ai_track() {
    let registry = Arc::new(ModelRegistry::default());
    let backend: Arc<dyn InferenceBackend> = registry.clone();

    let (mut session, _controller) = SessionProcessor::new(spec());
    session.prepare(&spec()).unwrap();
    session.set_enhancer_enabled(false);
    let vocal = TrackKind::Vocal.index();
    session
        .chains_mut()
        .add_inference_effect(vocal, "vocal-clarity", backend);
    session.chains_mut().set_mode(vocal, EffectMode::Ai);

    // No model yet: the track passes through
    let input = stereo_sine(BLOCK, 330.0, 0.5);
    let mut block = input.clone();
    session.process_block(&mut block, Transport::default()).unwrap();
    assert_eq!(block, input);

    registry.register("vocal-clarity", Arc::new(KernelModel::identity(0.5)));
    let mut block = input.clone();
    session.process_block(&mut block, Transport::default()).unwrap();
    for (out, inp) in block.channel(0).iter().zip(input.channel(0)) {
        assert!((out - inp * 0.5).abs() < 1e-6);
    }
}

// ============================================================================
// SESSION
// ============================================================================

#[test]
fn test_controller_commands_reach_audio_side() {
    let (mut session, controller) = SessionProcessor::new(spec());
    session.prepare(&spec()).unwrap();
    session.set_enhancer_enabled(false);

    let hihat = TrackKind::HiHat.index();
    controller
        .add_dsp_effect(hihat, EffectKind::TransientShaper.build())
        .unwrap();
    controller.set_mode(hihat, EffectMode::Dsp).unwrap();

    let mut block = stereo_sine(BLOCK, 1000.0, 0.3);
    session.process_block(&mut block, Transport::default()).unwrap();

    let track = session.chains().track(hihat).unwrap();
    assert_eq!(track.mode, EffectMode::Dsp);
    assert_eq!(track.effect_names(ChainSlot::Dsp), vec!["Transient Shaper"]);
}

#[test]
fn test_session_follows_transport_tempo() {
    let (mut session, _controller) = SessionProcessor::new(spec());
    session.prepare(&spec()).unwrap();

    let transport = Transport {
        is_playing: true,
        position_seconds: 1.5,
        bpm: 90.0,
    };
    let mut block = stereo_sine(BLOCK, 440.0, 0.2);
    session.process_block(&mut block, transport).unwrap();
    assert_eq!(session.bpm(), 90.0);
    assert!(session.transport().is_playing);

    // Zero tempo from the host is ignored
    let mut block = stereo_sine(BLOCK, 440.0, 0.2);
    session
        .process_block(&mut block, Transport { bpm: 0.0, ..transport })
        .unwrap();
    assert_eq!(session.bpm(), 90.0);
}

#[test]
fn test_session_state_json_round_trip() {
    let (mut session, _controller) = SessionProcessor::new(spec());
    session.set_bpm(140.0);
    session.set_enhancer_enabled(false);
    session.chains_mut().set_mode(2, EffectMode::Hybrid);
    let json = session.state_json().unwrap();

    let (mut restored, _controller) = SessionProcessor::new(spec());
    restored.restore_json(&json).unwrap();
    assert_eq!(restored.state(), session.state());
}

// ============================================================================
// NORMALIZER CONVERGENCE
// ============================================================================

#[test]
fn test_normalizer_converges_without_overshoot() {
    let mut normalizer = LoudnessNormalizer::new(LoudnessNormalizerParams { target_db: -14.0 });
    normalizer.prepare(&spec());

    // 0.1 amplitude sine sits near -23 dB RMS, about 9 dB under target
    let input = stereo_sine(BLOCK, 440.0, 0.1);
    let mut previous = normalizer.current_gain();
    for _ in 0..(48000 / BLOCK) * 60 {
        let mut block = input.clone();
        normalizer.process(&mut block).unwrap();
        let gain = normalizer.current_gain();
        assert!(gain >= previous - 1e-6, "gain fell from {} to {}", previous, gain);
        assert!(gain_to_db(gain) <= 12.0 + 1e-3);
        previous = gain;
    }

    let expected_db = -14.0 - normalizer.measured_level_db();
    assert!((gain_to_db(normalizer.current_gain()) - expected_db).abs() < 0.5);
    assert!(gain_to_db(normalizer.target_gain()) <= 12.0 + 1e-3);
}

#[test]
fn test_normalizer_correction_is_clamped() {
    let mut normalizer = LoudnessNormalizer::default();
    normalizer.prepare(&spec());

    // Near-silence wants far more than 12 dB of boost
    let input = stereo_sine(BLOCK, 440.0, 0.0001);
    for _ in 0..(48000 / BLOCK) * 3 {
        let mut block = input.clone();
        normalizer.process(&mut block).unwrap();
    }
    assert!((gain_to_db(normalizer.target_gain()) - 12.0).abs() < 1e-3);
}

// ============================================================================
// RESET
// ============================================================================

const STATEFUL_KINDS: [EffectKind; 14] = [
    EffectKind::Equalizer,
    EffectKind::Compressor,
    EffectKind::Reverb,
    EffectKind::Limiter,
    EffectKind::HighPass,
    EffectKind::Delay,
    EffectKind::Modulation,
    EffectKind::CinematicReverb,
    EffectKind::Multiband,
    EffectKind::SpaceReverb,
    EffectKind::DeEsser,
    EffectKind::TransientShaper,
    EffectKind::LoudnessNormalizer,
    EffectKind::FxSuite,
];

fn excite(effect: &mut dyn Effect) {
    effect.prepare(&spec());
    for _ in 0..8 {
        let mut block = stereo_sine(BLOCK, 440.0, 0.8);
        effect.process(&mut block).unwrap();
    }
}

#[test]
fn test_reset_leaves_no_residual_energy() {
    for kind in STATEFUL_KINDS {
        let mut effect = kind.build();
        excite(effect.as_mut());
        effect.reset();
        effect.reset();

        let mut block = silence(BLOCK);
        effect.process(&mut block).unwrap();
        assert!(
            block.peak() < 1e-6,
            "{} left residual energy: {}",
            effect.name(),
            block.peak()
        );
    }
}

#[test]
fn test_reset_is_idempotent() {
    for kind in STATEFUL_KINDS {
        let mut once = kind.build();
        let mut twice = kind.build();
        excite(once.as_mut());
        excite(twice.as_mut());
        once.reset();
        twice.reset();
        twice.reset();

        let mut a = stereo_sine(BLOCK, 660.0, 0.5);
        let mut b = a.clone();
        once.process(&mut a).unwrap();
        twice.process(&mut b).unwrap();
        assert_eq!(a, b, "{} differs after a second reset", once.name());
    }
}

#[test]
fn test_session_reset_is_idempotent() {
    let (mut session, _controller) = SessionProcessor::new(spec());
    session.prepare(&spec()).unwrap();
    for _ in 0..8 {
        let mut block = stereo_sine(BLOCK, 440.0, 0.8);
        session.process_block(&mut block, Transport::default()).unwrap();
    }
    session.reset();
    session.reset();

    let mut block = silence(BLOCK);
    session.process_block(&mut block, Transport::default()).unwrap();
    assert!(block.peak() < 1e-6);
}
