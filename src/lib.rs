//! vigil: camera watcher with spoken alerts.
//!
//! A single synchronous loop polls a camera, runs an object detector on each
//! frame and shows the results. When the set of detected labels changes, a
//! phrase describing it is offered for speech. Speech runs on its own worker
//! thread so the loop never waits on it.
//!
//! # Alert cadence
//!
//! Two independent filters decide what gets spoken:
//!
//! 1. The loop only offers a summary when it differs from the previous frame's.
//! 2. `AnnouncementGate` drops an identical phrase repeated within the cooldown.
//!
//! Accepted phrases go to a bounded `AnnouncementQueue` with an explicit
//! overflow policy, so a burst of changes cannot build up minutes of stale
//! speech.
//!
//! # Module Structure
//!
//! - `frame`: captured RGB frames
//! - `ingest`: frame sources (synthetic `stub://` camera, V4L2 devices)
//! - `detect`: detector backends and detection sets
//! - `announce`: cooldown gate, bounded queue, voice stage
//! - `speech`: speech engines and the speech worker
//! - `present`: presentation sinks and frame annotation
//! - `pipeline`: the detection loop
//! - `config`: file and environment configuration

pub mod announce;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod present;
pub mod speech;

pub use announce::{
    Announcement, AnnouncementGate, AnnouncementQueue, Enqueued, OverflowPolicy, QueueItem,
    VoiceAlerts, VoiceOutcome,
};
pub use config::VigilConfig;
pub use detect::{
    BackendRegistry, Detection, DetectionResult, DetectionSet, DetectorBackend, MotionBackend,
    ScriptedBackend,
};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FrameSource};
pub use pipeline::{CycleReport, DetectionLoop, LoopConfig, RunOutcome, RunSummary};
pub use present::{ConsoleSink, PresentationSink, StatusLevel, UiMode};
pub use speech::{
    LogSynthesizer, ShutdownOutcome, SpeechSynthesizer, SpeechWorker, SpeechWorkerHandle,
    WorkerState,
};
