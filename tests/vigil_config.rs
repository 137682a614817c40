use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use vigil::config::VigilConfig;
use vigil::speech::SpeechEngine;
use vigil::OverflowPolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VIGIL_CONFIG",
        "VIGIL_CAMERA_INDEX",
        "VIGIL_CAMERA_DEVICE",
        "VIGIL_FRAME_INTERVAL_MS",
        "VIGIL_DETECTOR",
        "VIGIL_MODEL_PATH",
        "VIGIL_VOICE",
        "VIGIL_VOICE_COOLDOWN_SECS",
        "VIGIL_TTS_ENGINE",
        "VIGIL_SNAPSHOT_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "index": 1, "width": 800, "height": 600 },
        "loop": { "frame_interval_ms": 200, "max_frames": 50 },
        "detector": { "backend": "scripted", "script": [[], ["boat"]] },
        "voice": {
            "template": "Heads up: {labels}",
            "cooldown_secs": 8,
            "queue_capacity": 2,
            "overflow": "drop-newest",
            "engine": "log"
        },
        "presentation": { "snapshot_path": "/tmp/vigil-latest.jpg" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("VIGIL_CONFIG", file.path());
    std::env::set_var("VIGIL_CAMERA_INDEX", "3");
    std::env::set_var("VIGIL_VOICE_COOLDOWN_SECS", "12");

    let cfg = VigilConfig::load().expect("load config");
    assert_eq!(cfg.camera.index, 3);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.frame_interval, Duration::from_millis(200));
    assert_eq!(cfg.max_frames, Some(50));
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.detector.script, vec![vec![], vec!["boat".to_string()]]);
    assert_eq!(cfg.voice.template, "Heads up: {labels}");
    assert_eq!(cfg.voice.cooldown, Duration::from_secs(12));
    assert_eq!(cfg.voice.queue_capacity, 2);
    assert_eq!(cfg.voice.overflow, OverflowPolicy::DropNewest);
    assert_eq!(cfg.voice.engine, SpeechEngine::Log);
    assert_eq!(
        cfg.snapshot_path,
        Some(PathBuf::from("/tmp/vigil-latest.jpg"))
    );

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [camera]
        device = "stub://dock"

        [voice]
        enabled = false
        shutdown_timeout_ms = 500
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("VIGIL_CONFIG", file.path());
    std::env::set_var("VIGIL_DETECTOR", "Motion");

    let cfg = VigilConfig::load().expect("load config");
    assert_eq!(cfg.camera.device.as_deref(), Some("stub://dock"));
    assert_eq!(cfg.camera.device_path(), "stub://dock");
    assert!(!cfg.voice.enabled);
    assert_eq!(cfg.voice.shutdown_timeout, Duration::from_millis(500));
    assert_eq!(cfg.detector.backend, "motion");

    clear_env();
}

#[test]
fn env_only_defaults_and_switches() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIGIL_VOICE", "off");
    std::env::set_var("VIGIL_TTS_ENGINE", "espeak");
    std::env::set_var("VIGIL_FRAME_INTERVAL_MS", "40");

    let cfg = VigilConfig::load().expect("load config");
    assert_eq!(cfg.camera.index, 0);
    assert_eq!(cfg.camera.device_path(), "/dev/video0");
    assert!(!cfg.voice.enabled);
    assert_eq!(cfg.voice.engine, SpeechEngine::Espeak);
    assert_eq!(cfg.frame_interval, Duration::from_millis(40));

    let looped = cfg.loop_config();
    assert_eq!(looped.frame_interval, Duration::from_millis(40));
    assert_eq!(looped.max_frames, None);

    clear_env();
}

#[test]
fn rejects_out_of_range_camera_index() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIGIL_CAMERA_INDEX", "11");
    let err = VigilConfig::load().unwrap_err();
    assert!(err.to_string().contains("camera.index"));

    std::env::set_var("VIGIL_CAMERA_INDEX", "front");
    assert!(VigilConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_bad_switch_and_unknown_detector() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VIGIL_VOICE", "sometimes");
    assert!(VigilConfig::load().is_err());
    clear_env();

    std::env::set_var("VIGIL_DETECTOR", "yolo-cloud");
    let err = VigilConfig::load().unwrap_err();
    assert!(err.to_string().contains("unknown"));

    clear_env();
}
