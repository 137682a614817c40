use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};

use super::{Announcement, AnnouncementGate, AnnouncementQueue, Enqueued};

/// Placeholder replaced by the detection summary in phrase templates.
pub const LABELS_PLACEHOLDER: &str = "{labels}";

/// What happened to a detection summary offered for speech.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoiceOutcome {
    Queued { text: String },
    /// Queued after evicting an older, still pending announcement.
    QueuedDisplacing { text: String, displaced: String },
    /// Identical text already accepted within the cooldown.
    Suppressed { text: String },
    /// The queue refused it (full under drop-newest, or closed).
    Dropped { text: String },
}

impl VoiceOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            VoiceOutcome::Queued { .. } | VoiceOutcome::QueuedDisplacing { .. }
        )
    }
}

/// Voice stage of the detection loop: phrase template, cooldown gate and the
/// producer side of the announcement queue.
pub struct VoiceAlerts {
    template: String,
    gate: AnnouncementGate,
    queue: Arc<AnnouncementQueue>,
}

impl VoiceAlerts {
    pub fn new(
        template: impl Into<String>,
        gate: AnnouncementGate,
        queue: Arc<AnnouncementQueue>,
    ) -> Result<Self> {
        let template = template.into();
        if !template.contains(LABELS_PLACEHOLDER) {
            return Err(anyhow!(
                "announcement template '{}' must contain {}",
                template,
                LABELS_PLACEHOLDER
            ));
        }
        Ok(Self {
            template,
            gate,
            queue,
        })
    }

    /// Phrase spoken for a detection summary.
    pub fn phrase(&self, summary: &str) -> String {
        self.template.replace(LABELS_PLACEHOLDER, summary)
    }

    /// Pass a changed detection summary through the gate and onto the queue.
    pub fn offer(&mut self, summary: &str, now: Instant) -> Result<VoiceOutcome> {
        let text = self.phrase(summary);
        if !self.gate.should_announce(&text, now) {
            log::debug!("announcement suppressed (cooldown): {}", text);
            return Ok(VoiceOutcome::Suppressed { text });
        }
        let outcome = match self.queue.enqueue(Announcement::new(text.clone(), now))? {
            Enqueued::Accepted => {
                log::info!("announcement queued: {}", text);
                VoiceOutcome::Queued { text }
            }
            Enqueued::DisplacedOldest(displaced) => {
                log::warn!(
                    "announcement queue full, dropped stale announcement: {}",
                    displaced.text
                );
                VoiceOutcome::QueuedDisplacing {
                    text,
                    displaced: displaced.text,
                }
            }
            Enqueued::Rejected(_) => {
                log::warn!("announcement queue full, dropped: {}", text);
                VoiceOutcome::Dropped { text }
            }
            Enqueued::Closed(_) => {
                log::debug!("announcement queue closed, dropped: {}", text);
                VoiceOutcome::Dropped { text }
            }
        };
        Ok(outcome)
    }

    pub fn queue(&self) -> &Arc<AnnouncementQueue> {
        &self.queue
    }
}
