//! De-duplicated, rate-limited announcements.
//!
//! Detection cycles run at frame rate; speech runs at a few seconds per
//! utterance. This module sits between the two:
//! - `AnnouncementGate` suppresses an identical text repeated within the cooldown
//! - `AnnouncementQueue` hands accepted texts to the speech worker without blocking
//! - `VoiceAlerts` ties both to the phrase template used for a detection summary

mod gate;
mod queue;
mod voice;

use std::time::Instant;

pub use gate::{AnnouncementGate, DEFAULT_COOLDOWN};
pub use queue::{AnnouncementQueue, Enqueued, OverflowPolicy, QueueItem};
pub use voice::{VoiceAlerts, VoiceOutcome, LABELS_PLACEHOLDER};

/// One text accepted for speech.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub text: String,
    /// When the gate accepted this text.
    pub accepted_at: Instant,
}

impl Announcement {
    pub fn new(text: impl Into<String>, accepted_at: Instant) -> Self {
        Self {
            text: text.into(),
            accepted_at,
        }
    }

    /// Time the announcement has spent waiting since it was accepted.
    pub fn waited_ms(&self) -> u128 {
        self.accepted_at.elapsed().as_millis()
    }
}
