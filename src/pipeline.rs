//! Detection loop.
//!
//! One synchronous loop: read a frame, detect, present, and (when voice is
//! enabled) offer changed detection summaries to the announcement queue. A
//! fixed sleep between cycles throttles CPU usage. Capture failures end the run
//! with a status message; they are outcomes, not errors. Detector errors
//! propagate after the camera has been released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::announce::{VoiceAlerts, VoiceOutcome};
use crate::detect::{DetectionResult, DetectionSet, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::present::{PresentationSink, StatusLevel};

/// Banner prefix shown while something is detected.
pub const BANNER_PREFIX: &str = "DETECTED: ";

#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Fixed delay between cycles. Not adjusted for detector latency.
    pub frame_interval: Duration,
    /// Stop after this many frames (None = until stopped or the camera fails).
    pub max_frames: Option<u64>,
    pub health_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            max_frames: None,
            health_log_interval: Duration::from_secs(5),
        }
    }
}

/// Why a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The camera could not be opened; no frame was processed.
    OpenFailed { error: String },
    /// A frame read failed mid-run.
    ReadFailed { error: String },
    /// The stop flag was raised.
    Stopped,
    /// `max_frames` frames were processed.
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub frames: u64,
    pub announcements: u64,
}

/// What one cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub labels: DetectionSet,
    pub banner: Option<String>,
    /// Set only when the summary changed and voice is enabled.
    pub voice: Option<VoiceOutcome>,
}

pub struct DetectionLoop {
    config: LoopConfig,
    voice: Option<VoiceAlerts>,
    /// Joined label string of the previous cycle; empty after an empty frame.
    previous_summary: String,
    frames: u64,
    announcements: u64,
}

impl DetectionLoop {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            voice: None,
            previous_summary: String::new(),
            frames: 0,
            announcements: 0,
        }
    }

    /// Enable spoken alerts.
    pub fn with_voice(mut self, voice: VoiceAlerts) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Present one frame's results and update alert state.
    pub fn process(
        &mut self,
        frame: &Frame,
        result: &DetectionResult,
        sink: &mut dyn PresentationSink,
        now: Instant,
    ) -> Result<CycleReport> {
        self.frames += 1;
        sink.show_frame(frame, result);

        let labels = result.label_set();
        if labels.is_empty() {
            sink.clear_alert();
            self.previous_summary.clear();
            return Ok(CycleReport {
                labels,
                banner: None,
                voice: None,
            });
        }

        let summary = labels.summary();
        let banner = format!("{}{}", BANNER_PREFIX, summary);
        sink.show_alert(&banner);

        let mut voice = None;
        if summary != self.previous_summary {
            log::info!("detection changed: {}", summary);
            if let Some(alerts) = self.voice.as_mut() {
                let outcome = alerts.offer(&summary, now)?;
                if outcome.is_queued() {
                    self.announcements += 1;
                }
                voice = Some(outcome);
            }
            self.previous_summary = summary;
        }

        Ok(CycleReport {
            labels,
            banner: Some(banner),
            voice,
        })
    }

    /// Run until the stop flag is raised, the frame limit is reached or the
    /// camera fails. The source is released on every exit path.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn DetectorBackend,
        sink: &mut dyn PresentationSink,
        stop: &AtomicBool,
    ) -> Result<RunSummary> {
        let name = source.describe();
        let start_frames = self.frames;
        let start_announcements = self.announcements;

        if let Err(err) = source.connect() {
            log::error!("failed to open {}: {:#}", name, err);
            sink.status(
                StatusLevel::Error,
                &format!("Failed to open {}. Try a different index!", name),
            );
            source.release();
            return Ok(RunSummary {
                outcome: RunOutcome::OpenFailed {
                    error: format!("{:#}", err),
                },
                frames: 0,
                announcements: 0,
            });
        }
        sink.status(StatusLevel::Success, &format!("Using {}", name));

        let polled = {
            let mut camera = ReleaseOnDrop { source };
            self.poll(camera.source(), detector, sink, stop)
        };
        sink.status(StatusLevel::Info, "Camera released");
        let outcome = polled?;

        let summary = RunSummary {
            outcome,
            frames: self.frames - start_frames,
            announcements: self.announcements - start_announcements,
        };
        log::info!(
            "run finished: {:?} after {} frames, {} announcements queued",
            summary.outcome,
            summary.frames,
            summary.announcements
        );
        Ok(summary)
    }

    fn poll(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn DetectorBackend,
        sink: &mut dyn PresentationSink,
        stop: &AtomicBool,
    ) -> Result<RunOutcome> {
        let mut processed = 0u64;
        let mut last_health_log = Instant::now();
        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(RunOutcome::Stopped);
            }
            if self.config.max_frames.is_some_and(|max| processed >= max) {
                return Ok(RunOutcome::FrameLimit);
            }

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("frame read failed: {:#}", err);
                    sink.status(
                        StatusLevel::Warning,
                        "Camera disconnected or frame read failed",
                    );
                    return Ok(RunOutcome::ReadFailed {
                        error: format!("{:#}", err),
                    });
                }
            };

            let result = detector.detect(&frame)?;
            self.process(&frame, &result, sink, Instant::now())?;
            log::trace!(
                "frame {} handled {} ms after capture",
                frame.sequence,
                frame.age_ms()
            );
            processed += 1;

            if last_health_log.elapsed() >= self.config.health_log_interval {
                let queue_depth = self
                    .voice
                    .as_ref()
                    .map(|voice| voice.queue().len())
                    .unwrap_or(0);
                log::info!(
                    "camera health={} frames={} announcements={} queue_depth={}",
                    source.is_healthy(),
                    self.frames,
                    self.announcements,
                    queue_depth
                );
                last_health_log = Instant::now();
            }

            if !self.config.frame_interval.is_zero() {
                std::thread::sleep(self.config.frame_interval);
            }
        }
    }
}

struct ReleaseOnDrop<'a> {
    source: &'a mut dyn FrameSource,
}

impl ReleaseOnDrop<'_> {
    fn source(&mut self) -> &mut dyn FrameSource {
        &mut *self.source
    }
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.source.release();
    }
}
