//! Cadenza CLI Application

use anyhow::{anyhow, Context};
use cadenza_core::domain::{
    CadenzaConfig, ConfigManager, ConfigWatcher, InferenceBackend, MasteringChain, MasteringParams,
    MasteringPreset, PresetManager, ProcessSpec, SessionProcessor,
};
use cadenza_infra::{
    read_wav, render_offline, write_wav, ModelRegistry, PlaybackStream, RENDER_BLOCK_SIZE,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(about = "Real-time vocal and mix effects pipeline", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a WAV file through the session and write the result
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file (32-bit float)
        output: PathBuf,

        /// Mastering preset: a factory name or a saved preset
        #[arg(short, long)]
        preset: Option<String>,

        /// Skip the mastering chain
        #[arg(long)]
        no_mastering: bool,

        /// JSON map of model role to model file
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Processing block size in frames
        #[arg(short, long, default_value_t = RENDER_BLOCK_SIZE)]
        block_size: usize,
    },

    /// Play a WAV file through the session on an output device
    Play {
        /// Input WAV file
        input: PathBuf,

        /// Mastering preset: a factory name or a saved preset
        #[arg(short, long)]
        preset: Option<String>,

        /// Output device name (default device if omitted)
        #[arg(short, long)]
        device: Option<String>,

        /// JSON map of model role to model file
        #[arg(short, long)]
        models: Option<PathBuf>,
    },

    /// Write the factory default configuration
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Manage mastering presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// List factory and saved presets
    List,

    /// Save a factory preset's settings under a new name
    Save {
        name: String,

        /// Factory preset to start from
        #[arg(short, long, default_value = "cinematic_vocal")]
        from: String,
    },

    /// Print a preset as TOML
    Show { name: String },

    /// Delete a saved preset
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConfigManager::default_config_dir()?.join("config.toml"),
    };

    match cli.command {
        Commands::InitConfig { force } => init_config(&config_path, force).await,
        Commands::Render {
            input,
            output,
            preset,
            no_mastering,
            models,
            block_size,
        } => {
            let config = load_config(&config_path).await?;
            let presets = preset_manager(&config, &config_path);
            render(
                &config,
                &presets,
                &input,
                &output,
                preset.as_deref(),
                !no_mastering,
                models,
                block_size,
            )
            .await
        }
        Commands::Play {
            input,
            preset,
            device,
            models,
        } => {
            let config = load_config(&config_path).await?;
            let presets = preset_manager(&config, &config_path);
            play(&config, &presets, &input, preset.as_deref(), device, models).await
        }
        Commands::Presets { action } => {
            let config = load_config(&config_path).await?;
            let presets = preset_manager(&config, &config_path);
            run_preset_action(&presets, action).await
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

async fn load_config(path: &Path) -> anyhow::Result<CadenzaConfig> {
    if path.exists() {
        return CadenzaConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load {}", path.display()));
    }
    match path.parent() {
        Some(dir) => Ok(ConfigManager::new(dir.to_path_buf()).load().await),
        None => Ok(CadenzaConfig::factory_default()),
    }
}

async fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    CadenzaConfig::factory_default().save_to_file(path).await?;
    info!("Wrote factory configuration to {}", path.display());
    Ok(())
}

/// Preset directory, relative paths resolved against the config file
fn preset_manager(config: &CadenzaConfig, config_path: &Path) -> PresetManager {
    let dir = &config.app.preset_dir;
    let dir = if dir.is_relative() {
        config_path
            .parent()
            .map(|base| base.join(dir))
            .unwrap_or_else(|| dir.clone())
    } else {
        dir.clone()
    };
    PresetManager::new(dir)
}

async fn resolve_preset(presets: &PresetManager, name: &str) -> anyhow::Result<MasteringParams> {
    if let Ok(preset) = name.parse::<MasteringPreset>() {
        return Ok(factory_params(preset));
    }
    presets
        .load_preset(name)
        .await
        .with_context(|| format!("Unknown preset '{}'", name))
}

fn factory_params(preset: MasteringPreset) -> MasteringParams {
    let mut chain = MasteringChain::new();
    chain.apply_preset(preset);
    chain.params()
}

// ============================================================================
// SESSION
// ============================================================================

/// Model map from the command line, falling back to the config
fn model_map(config: &CadenzaConfig, override_path: Option<PathBuf>) -> Option<PathBuf> {
    override_path.or_else(|| config.ai.model_map.clone())
}

async fn load_models(model_map: Option<&Path>) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::default());
    if let Some(path) = model_map {
        match registry.load_models_from_config(path).await {
            Ok(count) => info!("{} models ready: {:?}", count, registry.loaded_roles()),
            Err(e) => warn!("Models unavailable, AI tracks pass through: {}", e),
        }
    }
    registry
}

/// Reload models whenever a file next to the model map changes
///
/// The returned watcher must stay alive for reloads to keep firing.
async fn watch_models(
    registry: &Arc<ModelRegistry>,
    model_map: &Path,
) -> anyhow::Result<ConfigWatcher> {
    let dir = match model_map.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let watcher = ConfigWatcher::new(dir).await?;
    tokio::spawn(Arc::clone(registry).reload_on_change(watcher.subscribe()));
    Ok(watcher)
}

async fn build_session(
    config: &CadenzaConfig,
    presets: &PresetManager,
    spec: ProcessSpec,
    preset: Option<&str>,
    registry: Arc<ModelRegistry>,
) -> anyhow::Result<SessionProcessor> {
    let (mut session, _controller) = SessionProcessor::new(spec);
    session.prepare(&spec)?;
    let backend: Arc<dyn InferenceBackend> = registry;
    config.apply_to(&mut session, backend);

    if let Some(name) = preset {
        let params = resolve_preset(presets, name).await?;
        session.mastering_mut().set_params(params);
        info!("Mastering preset '{}'", name);
    }
    Ok(session)
}

#[allow(clippy::too_many_arguments)]
async fn render(
    config: &CadenzaConfig,
    presets: &PresetManager,
    input: &Path,
    output: &Path,
    preset: Option<&str>,
    mastering: bool,
    models: Option<PathBuf>,
    block_size: usize,
) -> anyhow::Result<()> {
    let audio = read_wav(input)?;
    let spec = ProcessSpec::new(audio.sample_rate as f64, block_size, audio.num_channels());
    let registry = load_models(model_map(config, models).as_deref()).await;
    let mut session = build_session(config, presets, spec, preset, registry).await?;
    if !mastering {
        session.set_enhancer_enabled(false);
    }

    let rendered = render_offline(&mut session, &audio.buffer, spec.sample_rate, block_size)?;
    write_wav(output, &rendered, audio.sample_rate)?;

    let meters = session.meters().snapshot();
    info!(
        "Rendered {:.2}s to {} (peak {:.3}, loudness {:.1} dB)",
        audio.duration_seconds(),
        output.display(),
        rendered.peak(),
        meters.loudness_db
    );
    Ok(())
}

async fn play(
    config: &CadenzaConfig,
    presets: &PresetManager,
    input: &Path,
    preset: Option<&str>,
    device: Option<String>,
    models: Option<PathBuf>,
) -> anyhow::Result<()> {
    let audio = read_wav(input)?;
    let block_size = config.app.block_size as usize;
    let spec = ProcessSpec::new(audio.sample_rate as f64, block_size, audio.num_channels());
    let model_map = model_map(config, models);
    let registry = load_models(model_map.as_deref()).await;
    let _watcher = match (&model_map, config.ai.hot_reload) {
        (Some(path), true) => match watch_models(&registry, path).await {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Model hot reload disabled: {}", e);
                None
            }
        },
        _ => None,
    };
    let session = build_session(config, presets, spec, preset, registry).await?;

    let stream = PlaybackStream::start(session, audio, block_size, device.as_deref())?;
    info!("Playing {} ({:.1}s)", input.display(), stream.duration_seconds());

    let meters = stream.meters();
    let decay_per_tick = config.app.meter_decay_rate * 0.5;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if stream.is_finished() {
                    break;
                }
                let snapshot = meters.snapshot();
                info!(
                    "{:6.1}s  out {:6.1} dB  hold {:6.1} dB  loudness {:6.1} dB",
                    stream.position_seconds(),
                    cadenza_core::domain::metering::level_to_db(snapshot.output_rms),
                    snapshot.output_peak_hold_db,
                    snapshot.loudness_db
                );
                meters.output.decay_peak(decay_per_tick);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped");
                break;
            }
        }
    }
    Ok(())
}

// ============================================================================
// PRESETS
// ============================================================================

async fn run_preset_action(presets: &PresetManager, action: PresetAction) -> anyhow::Result<()> {
    match action {
        PresetAction::List => {
            for preset in MasteringPreset::ALL {
                println!("{} (factory)", preset);
            }
            for name in presets.list_presets().await? {
                println!("{}", name);
            }
        }
        PresetAction::Save { name, from } => {
            let preset: MasteringPreset = from.parse().map_err(|e: String| anyhow!(e))?;
            presets.save_preset(&name, &factory_params(preset)).await?;
            info!("Saved preset '{}' from {}", name, preset);
        }
        PresetAction::Show { name } => {
            let params = resolve_preset(presets, &name).await?;
            print!("{}", toml::to_string_pretty(&params)?);
        }
        PresetAction::Delete { name } => {
            presets.delete_preset(&name).await?;
            info!("Deleted preset '{}'", name);
        }
    }
    Ok(())
}
