use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::announce::{OverflowPolicy, LABELS_PLACEHOLDER};
use crate::ingest::{CameraConfig, MAX_CAMERA_INDEX, MAX_FRAME_DIMENSION};
use crate::pipeline::LoopConfig;
use crate::speech::{SpeechConfig, SpeechEngine};

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 100;
const DEFAULT_DETECTOR: &str = "motion";
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_TEMPLATE: &str = "Alert: {labels} detected";
const DEFAULT_COOLDOWN_SECS: u64 = 5;
const DEFAULT_QUEUE_CAPACITY: usize = 4;
const DEFAULT_RATE: u32 = 180;
const DEFAULT_VOLUME: f32 = 1.0;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

const KNOWN_DETECTORS: &[&str] = &["motion", "scripted", "tract"];

#[derive(Debug, Deserialize, Default)]
struct VigilConfigFile {
    camera: Option<CameraConfigFile>,
    #[serde(rename = "loop")]
    detection_loop: Option<LoopConfigFile>,
    detector: Option<DetectorConfigFile>,
    voice: Option<VoiceConfigFile>,
    presentation: Option<PresentationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LoopConfigFile {
    frame_interval_ms: Option<u64>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    threshold: Option<f32>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    script: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize, Default)]
struct VoiceConfigFile {
    enabled: Option<bool>,
    template: Option<String>,
    cooldown_secs: Option<u64>,
    queue_capacity: Option<usize>,
    overflow: Option<String>,
    engine: Option<String>,
    voice: Option<String>,
    rate: Option<u32>,
    volume: Option<f32>,
    shutdown_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PresentationConfigFile {
    snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VigilConfig {
    pub camera: CameraConfig,
    pub frame_interval: Duration,
    pub max_frames: Option<u64>,
    pub detector: DetectorSettings,
    pub voice: VoiceSettings,
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels: Vec<String>,
    pub threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
    /// Per-frame label lists replayed by the scripted backend.
    pub script: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub template: String,
    pub cooldown: Duration,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub engine: SpeechEngine,
    pub voice: Option<String>,
    pub rate: u32,
    pub volume: f32,
    pub shutdown_timeout: Duration,
}

impl VigilConfig {
    /// Load from `VIGIL_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIGIL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults only, without reading the environment.
    pub fn defaults() -> Result<Self> {
        let mut cfg = Self::from_file(VigilConfigFile::default())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VigilConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            index: camera_file.index.unwrap_or(0),
            device: camera_file.device,
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };

        let loop_file = file.detection_loop.unwrap_or_default();
        let frame_interval = Duration::from_millis(
            loop_file
                .frame_interval_ms
                .unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
        );

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            model_path: detector_file.model_path,
            labels: detector_file.labels.unwrap_or_default(),
            threshold: detector_file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            input_width: detector_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
            script: detector_file.script.unwrap_or_default(),
        };

        let voice_file = file.voice.unwrap_or_default();
        let voice = VoiceSettings {
            enabled: voice_file.enabled.unwrap_or(true),
            template: voice_file
                .template
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            cooldown: Duration::from_secs(voice_file.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
            queue_capacity: voice_file.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            overflow: match voice_file.overflow.as_deref() {
                Some(policy) => policy.parse()?,
                None => OverflowPolicy::default(),
            },
            engine: match voice_file.engine.as_deref() {
                Some(engine) => engine.parse()?,
                None => SpeechEngine::default(),
            },
            voice: voice_file.voice,
            rate: voice_file.rate.unwrap_or(DEFAULT_RATE),
            volume: voice_file.volume.unwrap_or(DEFAULT_VOLUME),
            shutdown_timeout: Duration::from_millis(
                voice_file
                    .shutdown_timeout_ms
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            ),
        };

        Ok(Self {
            camera,
            frame_interval,
            max_frames: loop_file.max_frames,
            detector,
            voice,
            snapshot_path: file.presentation.and_then(|p| p.snapshot_path),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(index) = std::env::var("VIGIL_CAMERA_INDEX") {
            self.camera.index = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("VIGIL_CAMERA_INDEX must be an integer 0..={}", MAX_CAMERA_INDEX))?;
        }
        if let Ok(device) = std::env::var("VIGIL_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = Some(device);
            }
        }
        if let Ok(interval) = std::env::var("VIGIL_FRAME_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("VIGIL_FRAME_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.frame_interval = Duration::from_millis(millis);
        }
        if let Ok(backend) = std::env::var("VIGIL_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("VIGIL_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(voice) = std::env::var("VIGIL_VOICE") {
            self.voice.enabled = parse_switch(&voice)
                .ok_or_else(|| anyhow!("VIGIL_VOICE must be on/off, true/false or 1/0"))?;
        }
        if let Ok(cooldown) = std::env::var("VIGIL_VOICE_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.trim().parse().map_err(|_| {
                anyhow!("VIGIL_VOICE_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.voice.cooldown = Duration::from_secs(seconds);
        }
        if let Ok(engine) = std::env::var("VIGIL_TTS_ENGINE") {
            if !engine.trim().is_empty() {
                self.voice.engine = engine.parse()?;
            }
        }
        if let Ok(path) = std::env::var("VIGIL_SNAPSHOT_PATH") {
            if !path.trim().is_empty() {
                self.snapshot_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Check ranges and cross-field rules.
    pub fn validate(&mut self) -> Result<()> {
        if self.camera.index > MAX_CAMERA_INDEX {
            return Err(anyhow!(
                "camera.index must be within 0..={} (got {})",
                MAX_CAMERA_INDEX,
                self.camera.index
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera.width and camera.height must be greater than zero"));
        }
        if self.camera.width > MAX_FRAME_DIMENSION || self.camera.height > MAX_FRAME_DIMENSION {
            return Err(anyhow!(
                "camera.width and camera.height must be at most {}",
                MAX_FRAME_DIMENSION
            ));
        }
        if self.frame_interval.is_zero() {
            return Err(anyhow!("loop.frame_interval_ms must be greater than zero"));
        }
        self.detector.backend = self.detector.backend.trim().to_ascii_lowercase();
        if !KNOWN_DETECTORS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "detector.backend '{}' unknown (expected one of: {})",
                self.detector.backend,
                KNOWN_DETECTORS.join(", ")
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector.backend 'tract' requires detector.model_path"));
        }
        if !(0.0..=1.0).contains(&self.detector.threshold) {
            return Err(anyhow!("detector.threshold must be within 0.0..=1.0"));
        }
        if !self.voice.template.contains(LABELS_PLACEHOLDER) {
            return Err(anyhow!(
                "voice.template must contain {}",
                LABELS_PLACEHOLDER
            ));
        }
        if self.voice.cooldown.is_zero() {
            return Err(anyhow!("voice.cooldown_secs must be greater than zero"));
        }
        if self.voice.queue_capacity == 0 {
            return Err(anyhow!("voice.queue_capacity must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.voice.volume) {
            return Err(anyhow!("voice.volume must be within 0.0..=2.0"));
        }
        if self.voice.rate == 0 {
            return Err(anyhow!("voice.rate must be greater than zero"));
        }
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            frame_interval: self.frame_interval,
            max_frames: self.max_frames,
            ..LoopConfig::default()
        }
    }

    /// Engine settings, with binaries discovered from env/PATH.
    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            engine: self.voice.engine,
            rate: self.voice.rate,
            volume: self.voice.volume,
            voice: self.voice.voice.clone(),
            ..SpeechConfig::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<VigilConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
