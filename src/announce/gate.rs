use std::time::{Duration, Instant};

/// Default cooldown before an identical text may be announced again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Suppresses exact repeats of the last accepted text within a cooldown window.
///
/// A different text always passes. The gate is owned by the detection loop and
/// only ever touched from that thread.
#[derive(Clone, Debug)]
pub struct AnnouncementGate {
    cooldown: Duration,
    last_text: String,
    /// `None` until the first acceptance, which behaves like "long ago".
    last_time: Option<Instant>,
}

impl AnnouncementGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_text: String::new(),
            last_time: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns true, and records `text` and `now`, when `text` differs from the
    /// last accepted text or at least one cooldown has elapsed since it was
    /// accepted. The boundary is inclusive.
    pub fn should_announce(&mut self, text: &str, now: Instant) -> bool {
        let cooled_down = match self.last_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        };
        if text == self.last_text && !cooled_down {
            return false;
        }
        self.last_text.clear();
        self.last_text.push_str(text);
        self.last_time = Some(now);
        true
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

impl Default for AnnouncementGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: Duration = Duration::from_secs(5);

    #[test]
    fn repeat_within_cooldown_is_suppressed() {
        let mut gate = AnnouncementGate::new(W);
        let t1 = Instant::now();
        assert!(gate.should_announce("fire", t1));
        assert!(!gate.should_announce("fire", t1 + Duration::from_millis(4_999)));
        assert!(!gate.should_announce("fire", t1 + Duration::from_secs(1)));
    }

    #[test]
    fn different_text_always_passes() {
        let mut gate = AnnouncementGate::new(W);
        let t = Instant::now();
        assert!(gate.should_announce("fire", t));
        assert!(gate.should_announce("smoke", t));
        assert!(gate.should_announce("fire", t));
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let mut gate = AnnouncementGate::new(W);
        let t = Instant::now();
        assert!(gate.should_announce("fire", t));
        assert!(gate.should_announce("fire", t + W));
    }

    #[test]
    fn suppressed_call_does_not_restart_cooldown() {
        let mut gate = AnnouncementGate::new(W);
        let t = Instant::now();
        assert!(gate.should_announce("fire", t));
        assert!(!gate.should_announce("fire", t + Duration::from_secs(3)));
        // Measured from the accepted call at `t`, not the suppressed one.
        assert!(gate.should_announce("fire", t + Duration::from_secs(5)));
    }

    #[test]
    fn fresh_gate_accepts_empty_text() {
        let mut gate = AnnouncementGate::default();
        assert!(gate.should_announce("", Instant::now()));
        assert_eq!(gate.cooldown(), DEFAULT_COOLDOWN);
    }

    #[test]
    fn clock_going_backwards_is_treated_as_no_time_elapsed() {
        let mut gate = AnnouncementGate::new(W);
        let later = Instant::now() + Duration::from_secs(10);
        assert!(gate.should_announce("fire", later));
        assert!(!gate.should_announce("fire", later - Duration::from_secs(1)));
    }
}
