//! Config, preset, model and WAV files working together

use crate::signals::{stereo_sine, BLOCK, SAMPLE_RATE};
use cadenza_core::domain::{
    CadenzaConfig, ConfigManager, ConfigWatcher, EffectMode, InferenceBackend, MasteringChain, MasteringParams,
    MasteringPreset, PresetManager, ProcessSpec, SessionProcessor, TrackKind,
};
use cadenza_infra::{read_wav, render_offline, write_wav, ModelRegistry};
use std::sync::Arc;
use tempfile::TempDir;

async fn write_models(dir: &std::path::Path) -> std::path::PathBuf {
    tokio::fs::write(dir.join("clarity.json"), r#"{"kernel": [1.0], "gain": 0.25}"#)
        .await
        .unwrap();
    let map = dir.join("models.json");
    tokio::fs::write(&map, r#"{"vocal-clarity": "clarity.json"}"#)
        .await
        .unwrap();
    map
}

#[tokio::test]
async fn test_config_round_trip_configures_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = CadenzaConfig::factory_default();
    config.mastering.preset = Some(MasteringPreset::ViralAppeal);
    config.save_to_file(&path).await.unwrap();
    let loaded = CadenzaConfig::load_from_file(&path).await.unwrap();
    assert_eq!(loaded, config);

    let spec = loaded.app.to_spec();
    let (mut session, _controller) = SessionProcessor::new(spec);
    session.prepare(&spec).unwrap();
    loaded.apply_to(&mut session, Arc::new(ModelRegistry::default()));

    let mut expected = MasteringChain::new();
    expected.apply_preset(MasteringPreset::ViralAppeal);
    assert_eq!(session.mastering().params(), expected.params());
    assert_eq!(
        session.chains().mode(TrackKind::Vocal.index()),
        Some(EffectMode::Dsp)
    );
}

#[tokio::test]
async fn test_config_manager_recovers_from_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(dir.path().to_path_buf());
    tokio::fs::write(manager.config_path(), "tracks = [oops")
        .await
        .unwrap();

    let config = manager.load().await;
    assert_eq!(config, CadenzaConfig::factory_default());
    assert!(dir.path().join("config.toml.corrupt").exists());
}

#[tokio::test]
async fn test_saved_preset_applies_to_mastering() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().join("presets"));

    let mut params = MasteringParams::default();
    params.target_lufs = -10.0;
    params.stereo_width = 1.5;
    presets.save_preset("loud", &params).await.unwrap();

    let mut chain = MasteringChain::new();
    chain.set_params(presets.load_preset("loud").await.unwrap());
    assert_eq!(chain.params(), params);
}

#[tokio::test]
async fn test_registry_reload_reaches_running_session() {
    let dir = TempDir::new().unwrap();
    let map = write_models(dir.path()).await;

    let registry = Arc::new(ModelRegistry::default());
    assert_eq!(registry.load_models_from_config(&map).await.unwrap(), 1);

    let spec = ProcessSpec::new(SAMPLE_RATE, BLOCK, 2);
    let (mut session, _controller) = SessionProcessor::new(spec);
    session.prepare(&spec).unwrap();
    session.set_enhancer_enabled(false);
    let backend: Arc<dyn InferenceBackend> = registry.clone();
    session
        .chains_mut()
        .add_inference_effect(0, "vocal-clarity", backend);
    session.chains_mut().set_mode(0, EffectMode::Ai);

    let input = stereo_sine(BLOCK, 440.0, 0.8);
    let first = render_offline(&mut session, &input, SAMPLE_RATE, BLOCK).unwrap();
    assert!((first.peak() - input.peak() * 0.25).abs() < 1e-5);

    tokio::fs::write(dir.path().join("clarity.json"), r#"{"kernel": [1.0], "gain": 0.5}"#)
        .await
        .unwrap();
    registry.reload().await.unwrap();

    let second = render_offline(&mut session, &input, SAMPLE_RATE, BLOCK).unwrap();
    assert!((second.peak() - input.peak() * 0.5).abs() < 1e-5);
}

#[tokio::test]
async fn test_watched_model_file_reloads_registry() {
    let dir = TempDir::new().unwrap();
    let map = write_models(dir.path()).await;

    let registry = Arc::new(ModelRegistry::default());
    registry.load_models_from_config(&map).await.unwrap();
    let watcher = ConfigWatcher::new(dir.path().to_path_buf()).await.unwrap();
    let task = tokio::spawn(Arc::clone(&registry).reload_on_change(watcher.subscribe()));

    tokio::fs::write(dir.path().join("clarity.json"), r#"{"kernel": [1.0], "gain": 0.75}"#)
        .await
        .unwrap();

    let gain = |registry: &ModelRegistry| {
        let mut output = Vec::new();
        registry
            .run_inference(
                "vocal-clarity",
                &[1.0],
                cadenza_core::domain::TensorShape::for_block(1, 1),
                &mut output,
            )
            .map(|_| output[0])
            .unwrap_or(0.0)
    };
    let mut reloaded = false;
    for _ in 0..500 {
        if (gain(&registry) - 0.75).abs() < 1e-6 {
            reloaded = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(reloaded);
    task.abort();
}

#[tokio::test]
async fn test_wav_render_pipeline() {
    let dir = TempDir::new().unwrap();
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("out.wav");

    let input = stereo_sine(48000, 220.0, 0.5);
    write_wav(&input_path, &input, 48000).unwrap();

    let audio = read_wav(&input_path).unwrap();
    let spec = ProcessSpec::new(audio.sample_rate as f64, BLOCK, audio.num_channels());
    let (mut session, _controller) = SessionProcessor::new(spec);
    session.prepare(&spec).unwrap();
    CadenzaConfig::factory_default().apply_to(&mut session, Arc::new(ModelRegistry::default()));

    let rendered = render_offline(&mut session, &audio.buffer, spec.sample_rate, BLOCK).unwrap();
    write_wav(&output_path, &rendered, audio.sample_rate).unwrap();

    let output = read_wav(&output_path).unwrap();
    assert_eq!(output.buffer.num_samples(), 48000);
    assert_eq!(output.num_channels(), 2);
    assert!(output.buffer.peak() > 0.0);
    assert!(output.buffer.peak() <= 1.0);
}
