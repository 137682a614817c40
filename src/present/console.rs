use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::{PresentationSink, StatusLevel};
use crate::detect::DetectionResult;
use crate::frame::Frame;

const SNAPSHOT_MIN_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Terminal dashboard.
///
/// On a TTY a spinner line carries the live frame counter and the current
/// banner; otherwise banner changes and statuses are printed as plain lines.
/// When a snapshot path is set the latest annotated frame is also written to
/// disk as JPEG (feature: snapshots).
pub struct ConsoleSink {
    spinner: Option<ProgressBar>,
    banner: Option<String>,
    frames_shown: u64,
    started: Instant,
    snapshot_path: Option<PathBuf>,
    last_snapshot: Option<Instant>,
}

impl ConsoleSink {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let use_pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !disable_pretty,
                UiMode::Plain => false,
            };
        let spinner = use_pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message("waiting for camera…");
            spinner
        });
        Self {
            spinner,
            banner: None,
            frames_shown: 0,
            started: Instant::now(),
            snapshot_path: None,
            last_snapshot: None,
        }
    }

    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() && !cfg!(feature = "snapshots") {
            log::warn!("snapshot path ignored: built without the snapshots feature");
        }
        self.snapshot_path = path;
        self
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    fn print_line(&self, line: &str) {
        match &self.spinner {
            Some(spinner) => spinner.println(line),
            None => eprintln!("{}", line),
        }
    }

    fn refresh(&self) {
        if let Some(spinner) = &self.spinner {
            let fps = self.frames_shown as f64 / self.started.elapsed().as_secs_f64().max(0.001);
            let banner = self
                .banner
                .as_deref()
                .map(|text| format!("🚨 {} 🚨", text))
                .unwrap_or_else(|| "no detections".to_string());
            spinner.set_message(format!(
                "frame {} ({:.1} fps) | {}",
                self.frames_shown, fps, banner
            ));
        }
    }

    fn maybe_write_snapshot(&mut self, frame: &Frame, result: &DetectionResult) {
        let Some(path) = self.snapshot_path.clone() else {
            return;
        };
        if self
            .last_snapshot
            .is_some_and(|at| at.elapsed() < SNAPSHOT_MIN_INTERVAL)
        {
            return;
        }
        self.last_snapshot = Some(Instant::now());
        #[cfg(feature = "snapshots")]
        {
            let annotated = super::annotate::annotate(frame, result);
            if let Err(err) = write_jpeg(annotated, &path) {
                log::warn!("failed to write snapshot {}: {:#}", path.display(), err);
            }
        }
        #[cfg(not(feature = "snapshots"))]
        {
            let _ = (frame, result, path);
        }
    }
}

impl PresentationSink for ConsoleSink {
    fn show_frame(&mut self, frame: &Frame, result: &DetectionResult) {
        self.frames_shown += 1;
        self.maybe_write_snapshot(frame, result);
        self.refresh();
    }

    fn show_alert(&mut self, text: &str) {
        if self.banner.as_deref() == Some(text) {
            return;
        }
        self.banner = Some(text.to_string());
        if self.spinner.is_none() {
            self.print_line(&format!("🚨 {} 🚨", text));
        }
        self.refresh();
    }

    fn clear_alert(&mut self) {
        if self.banner.take().is_some() {
            if self.spinner.is_none() {
                self.print_line("alert cleared");
            }
            self.refresh();
        }
    }

    fn status(&mut self, level: StatusLevel, message: &str) {
        self.print_line(&format!("{} {}", level.symbol(), message));
    }
}

impl Drop for ConsoleSink {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

#[cfg(feature = "snapshots")]
fn write_jpeg(frame: Frame, path: &std::path::Path) -> anyhow::Result<()> {
    use anyhow::{anyhow, Context};

    let (width, height) = (frame.width, frame.height);
    let image = image::RgbImage::from_raw(width, height, frame.into_pixels())
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    // Write beside the target and rename so viewers never see a partial file.
    let tmp = path.with_extension("partial.jpg");
    image
        .save_with_format(&tmp, image::ImageFormat::Jpeg)
        .with_context(|| format!("encode {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_sink_tracks_banner() {
        let mut sink = ConsoleSink::new(UiMode::Plain, false, false);
        sink.show_alert("DETECTED: fire");
        assert_eq!(sink.banner(), Some("DETECTED: fire"));
        sink.clear_alert();
        assert_eq!(sink.banner(), None);
    }

    #[test]
    fn pretty_requires_tty() {
        let sink = ConsoleSink::new(UiMode::Pretty, false, false);
        assert!(sink.spinner.is_none());
    }

    #[test]
    fn ui_flag_parsing() {
        assert_eq!(UiMode::from_flag(Some("plain")), UiMode::Plain);
        assert_eq!(UiMode::from_flag(None), UiMode::Auto);
    }
}
