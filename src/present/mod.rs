//! Presentation sinks.
//!
//! The sink shows what the loop sees: the annotated frame, the alert banner and
//! run status messages. It is output only; nothing it does feeds back into
//! detection or announcements.

pub mod annotate;
mod console;

use crate::detect::DetectionResult;
use crate::frame::Frame;

pub use console::{ConsoleSink, UiMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn symbol(&self) -> &'static str {
        match self {
            StatusLevel::Success => "✔",
            StatusLevel::Info => "ℹ",
            StatusLevel::Warning => "⚠",
            StatusLevel::Error => "✖",
        }
    }
}

/// Where frames, alerts and run status go.
pub trait PresentationSink {
    /// Display the latest frame together with what was detected on it.
    fn show_frame(&mut self, frame: &Frame, result: &DetectionResult);

    /// Show (or replace) the alert banner.
    fn show_alert(&mut self, text: &str);

    /// Remove the alert banner, if any.
    fn clear_alert(&mut self);

    /// Report a run status message.
    fn status(&mut self, level: StatusLevel, message: &str);
}
