use anyhow::{Context, bail};
use clap::Parser;
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voxlog::cli::{Cli, Command, default_config_path, default_models_dir};
use voxlog::config::Config;
use voxlog::defaults;
use voxlog::models::catalog::resolve_model_path;
use voxlog::models::lifecycle::{LoadPhase, ModelLifecycle, StateChange};
use voxlog::pipeline::sink::{SegmentSink, StdoutSink};
use voxlog::pipeline::{Pipeline, PipelineConfig};
use voxlog::stt::engine::{ComputeDevice, Precision};
use voxlog::stt::whisper::WhisperEngine;
use voxlog::{CaptureBuffer, version_string};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => Config::load_or_default(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    }
    .with_env_overrides();
    config.validate()?;

    info!(version = %version_string(), "voxlog starting");

    match cli.command {
        Command::Devices => list_devices(),
        Command::Verify { model } => verify_model(&config, model).await,
        Command::Run {
            device,
            model,
            language,
            input,
            duration,
            show_confidence,
        } => {
            run(
                config,
                RunOptions {
                    device,
                    model,
                    language,
                    input,
                    duration,
                    show_confidence,
                },
            )
            .await
        }
    }
}

#[cfg(feature = "cpal-audio")]
fn list_devices() -> anyhow::Result<()> {
    let devices = voxlog::audio::device::list_input_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }
    for device in devices {
        if device.is_loopback_candidate {
            println!("{}. {} [system audio]", device.id + 1, device.name);
        } else {
            println!("{}. {}", device.id + 1, device.name);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_devices() -> anyhow::Result<()> {
    bail!("built without audio capture (enable the `cpal-audio` feature)")
}

fn model_path_for(config: &Config, model_override: Option<String>) -> PathBuf {
    let reference = model_override.unwrap_or_else(|| config.transcription.model.clone());
    resolve_model_path(&default_models_dir(), &reference)
}

async fn verify_model(config: &Config, model_override: Option<String>) -> anyhow::Result<()> {
    let model_path = model_path_for(config, model_override);
    let lifecycle = ModelLifecycle::new(Arc::new(WhisperEngine::new()))?;
    lifecycle.request_verify(&model_path);

    let snapshot = wait_for_terminal_phase(&lifecycle, None, &mut StdoutSink::new()).await;
    match snapshot.phase {
        LoadPhase::Verified => {
            println!("ok: {}", model_path.display());
            Ok(())
        }
        _ => {
            let message = snapshot
                .last_error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            bail!("verification failed: {}", message)
        }
    }
}

struct RunOptions {
    device: Option<String>,
    model: Option<String>,
    language: Option<String>,
    input: Option<PathBuf>,
    duration: Option<u64>,
    show_confidence: bool,
}

async fn run(config: Config, options: RunOptions) -> anyhow::Result<()> {
    let model_path = model_path_for(&config, options.model.clone());
    let language = Arc::new(RwLock::new(
        options
            .language
            .clone()
            .unwrap_or_else(|| config.transcription.language.clone()),
    ));

    let mut sink = if options.show_confidence {
        StdoutSink::new().with_confidence()
    } else {
        StdoutSink::new()
    };

    // Model load runs off the capture path; capture starts once it is done
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let lifecycle =
        Arc::new(ModelLifecycle::new(Arc::new(WhisperEngine::new()))?.with_events(event_tx));

    let (device, precision) = if config.transcription.use_gpu {
        (ComputeDevice::Cuda, Precision::Float16)
    } else {
        (ComputeDevice::Cpu, Precision::Int8)
    };
    lifecycle.request_load(&model_path, device, precision);

    let snapshot = wait_for_terminal_phase(&lifecycle, Some(&event_rx), &mut sink).await;
    if snapshot.phase != LoadPhase::Loaded {
        let message = snapshot
            .last_error
            .map(|e| e.message)
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("model load failed: {}", message);
    }

    let buffer = Arc::new(CaptureBuffer::new(
        config.audio.sample_rate,
        config.audio.buffer_seconds,
    ));

    // Live capture or file playback feeds the same buffer
    let capture = match &options.input {
        Some(path) => {
            let samples = voxlog::audio::wav::load_wav(path, config.audio.sample_rate)?;
            info!(
                path = %path.display(),
                seconds = samples.len() as f64 / config.audio.sample_rate as f64,
                "feeding WAV input"
            );
            spawn_file_feeder(samples, buffer.clone());
            None
        }
        None => Some(open_live_capture(&config, options.device.as_deref(), &buffer)?),
    };

    let pipeline_config = PipelineConfig {
        sample_rate: config.audio.sample_rate,
        min_chunk_seconds: config.audio.min_chunk_seconds,
        ..PipelineConfig::default()
    };
    let mut handle = Pipeline::new(pipeline_config, language).start(buffer, lifecycle);

    let deadline = options
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut level_tick =
        tokio::time::interval(Duration::from_millis(defaults::LEVEL_INTERVAL_MS));
    let mut drain_tick =
        tokio::time::interval(Duration::from_millis(defaults::RECONCILE_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
            _ = level_tick.tick() => {
                sink.on_level_update(handle.audio_level());
                drain_state_changes(&event_rx, &mut sink);
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
            _ = drain_tick.tick() => {
                let accepted = handle.poll_segments();
                if !accepted.is_empty() {
                    sink.on_segments_appended(&accepted);
                }
            }
        }
    }

    if let Some(stream) = capture {
        stream.stop()?;
    }
    let history = handle.stop();
    info!(segments = history.len(), "session finished");
    Ok(())
}

#[cfg(feature = "cpal-audio")]
fn open_live_capture(
    config: &Config,
    device_override: Option<&str>,
    buffer: &Arc<CaptureBuffer>,
) -> anyhow::Result<voxlog::audio::device::CaptureStream> {
    let device = device_override.or(config.audio.device.as_deref());
    Ok(voxlog::audio::device::open_capture(device, buffer.clone())?)
}

#[cfg(not(feature = "cpal-audio"))]
fn open_live_capture(
    _config: &Config,
    _device_override: Option<&str>,
    _buffer: &Arc<CaptureBuffer>,
) -> anyhow::Result<NoCapture> {
    bail!("built without audio capture (enable the `cpal-audio` feature or use --input)")
}

/// Placeholder stream type for builds without cpal.
#[cfg(not(feature = "cpal-audio"))]
struct NoCapture;

#[cfg(not(feature = "cpal-audio"))]
impl NoCapture {
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Feeds file samples into the capture buffer, pacing on buffer headroom
/// so a long file never overruns the ring.
fn spawn_file_feeder(samples: Vec<f32>, buffer: Arc<CaptureBuffer>) {
    std::thread::spawn(move || {
        let slice_len = buffer.sample_rate() as usize / 2; // 0.5s per push
        let mut cursor = 0;
        while cursor < samples.len() {
            let end = (cursor + slice_len).min(samples.len());
            if buffer.len() + (end - cursor) <= buffer.capacity() {
                buffer.push(&samples[cursor..end]);
                cursor = end;
            } else {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    });
}

/// Polls the lifecycle until it reaches a terminal phase, forwarding state
/// changes to the sink from this (presentation) context.
async fn wait_for_terminal_phase(
    lifecycle: &ModelLifecycle,
    events: Option<&Receiver<StateChange>>,
    sink: &mut dyn SegmentSink,
) -> voxlog::ModelLoadState {
    loop {
        if let Some(rx) = events {
            drain_state_changes(rx, sink);
        }
        let snapshot = lifecycle.snapshot();
        match snapshot.phase {
            LoadPhase::Loaded | LoadPhase::Verified | LoadPhase::Failed => {
                if let Some(rx) = events {
                    drain_state_changes(rx, sink);
                }
                return snapshot;
            }
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

fn drain_state_changes(rx: &Receiver<StateChange>, sink: &mut dyn SegmentSink) {
    for change in rx.try_iter() {
        sink.on_model_state_changed(change.phase, &change.message);
    }
}
