//! vigil - watch a camera and announce what it sees.
//!
//! 1. Loads configuration (VIGIL_CONFIG file, VIGIL_* env, then flags)
//! 2. Starts the speech worker once, before any frame is read
//! 3. Runs the detection loop until Ctrl-C, the frame limit or a camera failure
//! 4. Releases the camera and shuts the speech worker down with a deadline

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vigil::speech::build_synthesizer;
use vigil::{
    AnnouncementGate, AnnouncementQueue, BackendRegistry, CameraSource, ConsoleSink,
    DetectionLoop, DetectorBackend, MotionBackend, RunOutcome, ScriptedBackend, ShutdownOutcome,
    SpeechWorker, UiMode, VigilConfig, VoiceAlerts,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch a camera, show detections and announce them by voice"
)]
struct Args {
    /// Camera index (0 = default webcam, 1 = external USB camera, ...).
    #[arg(long, short = 'c', value_parser = clap::value_parser!(u32).range(0..=10))]
    camera_index: Option<u32>,

    /// Explicit capture device (e.g. /dev/video2 or stub://demo).
    #[arg(long)]
    device: Option<String>,

    /// Detector backend (motion, scripted, tract).
    #[arg(long)]
    detector: Option<String>,

    /// ONNX model for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Disable spoken alerts.
    #[arg(long)]
    no_voice: bool,

    /// Speech engine (auto, piper, espeak-ng, log).
    #[arg(long)]
    tts_engine: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Write the latest annotated frame to this JPEG path.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Console output: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut VigilConfig) -> Result<()> {
        if let Some(index) = self.camera_index {
            cfg.camera.index = index;
        }
        if let Some(device) = &self.device {
            cfg.camera.device = Some(device.clone());
        }
        if let Some(detector) = &self.detector {
            cfg.detector.backend = detector.clone();
        }
        if let Some(model) = &self.model {
            cfg.detector.model_path = Some(model.clone());
        }
        if self.no_voice {
            cfg.voice.enabled = false;
        }
        if let Some(engine) = &self.tts_engine {
            cfg.voice.engine = engine.parse()?;
        }
        if self.frames.is_some() {
            cfg.max_frames = self.frames;
        }
        if self.snapshot.is_some() {
            cfg.snapshot_path = self.snapshot.clone();
        }
        cfg.validate()
    }
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = VigilConfig::load()?;
    args.apply(&mut cfg)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let mut sink = ConsoleSink::new(UiMode::from_flag(Some(&args.ui)), is_tty, !stdout_is_tty)
        .with_snapshot_path(cfg.snapshot_path.clone());

    let mut detector = build_detector(&cfg)?;

    let mut detection_loop = DetectionLoop::new(cfg.loop_config());
    let worker = if cfg.voice.enabled {
        let queue = Arc::new(AnnouncementQueue::new(
            cfg.voice.queue_capacity,
            cfg.voice.overflow,
        ));
        let synthesizer = build_synthesizer(&cfg.speech_config())?;
        let worker = SpeechWorker::spawn(queue.clone(), synthesizer)?;
        let voice = VoiceAlerts::new(
            cfg.voice.template.clone(),
            AnnouncementGate::new(cfg.voice.cooldown),
            queue,
        )?;
        detection_loop = detection_loop.with_voice(voice);
        log::info!(
            "voice alerts on: cooldown={}s queue_capacity={} overflow={}",
            cfg.voice.cooldown.as_secs(),
            cfg.voice.queue_capacity,
            cfg.voice.overflow.as_str()
        );
        Some(worker)
    } else {
        log::info!("voice alerts off");
        None
    };

    let mut camera = CameraSource::new(cfg.camera.clone())?;
    let run = detection_loop.run(&mut camera, detector.as_mut(), &mut sink, &stop);
    drop(camera);

    if let Some(worker) = worker {
        match worker.shutdown(cfg.voice.shutdown_timeout)? {
            ShutdownOutcome::Joined => log::info!("speech worker stopped"),
            ShutdownOutcome::TimedOut => log::warn!("speech worker detached at shutdown"),
        }
    }

    let summary = run?;
    Ok(match summary.outcome {
        RunOutcome::OpenFailed { .. } => ExitCode::from(2),
        RunOutcome::ReadFailed { .. } => ExitCode::from(1),
        RunOutcome::Stopped | RunOutcome::FrameLimit => ExitCode::SUCCESS,
    })
}

fn build_detector(cfg: &VigilConfig) -> Result<Box<dyn DetectorBackend>> {
    let mut registry = BackendRegistry::new();
    registry.register(MotionBackend::new());
    registry.register(ScriptedBackend::new(cfg.detector.script.clone()));

    register_tract(&mut registry, cfg)?;

    registry.set_default(&cfg.detector.backend)?;
    registry.into_default()
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, cfg: &VigilConfig) -> Result<()> {
    if let Some(model_path) = &cfg.detector.model_path {
        let backend = vigil::detect::TractBackend::new(
            model_path,
            cfg.detector.input_width,
            cfg.detector.input_height,
            cfg.detector.labels.clone(),
        )?
        .with_threshold(cfg.detector.threshold);
        registry.register(backend);
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, cfg: &VigilConfig) -> Result<()> {
    if cfg.detector.model_path.is_some() {
        log::warn!("detector model ignored: built without the backend-tract feature");
    }
    Ok(())
}
