use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

use super::Announcement;

/// What to do when an announcement arrives at a full queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the stalest pending announcement to make room.
    #[default]
    DropOldest,
    /// Keep what is queued and discard the new announcement.
    DropNewest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::DropOldest => "drop-oldest",
            OverflowPolicy::DropNewest => "drop-newest",
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" | "drop_newest" | "newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(anyhow!(
                "unknown overflow policy '{}' (expected drop-oldest or drop-newest)",
                other
            )),
        }
    }
}

/// Item handed to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueItem {
    Speak(Announcement),
    /// Sentinel: the queue was closed and everything before it has been handed out.
    Shutdown,
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// Accepted after evicting the returned, older announcement.
    DisplacedOldest(Announcement),
    /// Queue full under `DropNewest`; the returned announcement was discarded.
    Rejected(Announcement),
    /// Queue closed; the returned announcement was discarded.
    Closed(Announcement),
}

impl Enqueued {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Enqueued::Accepted | Enqueued::DisplacedOldest(_))
    }
}

/// Bounded FIFO of announcements shared between the detection loop (producer)
/// and the speech worker (consumer).
///
/// `enqueue` never waits for the consumer. `close` acts as the shutdown
/// sentinel: items already queued are still delivered, then the consumer
/// receives `QueueItem::Shutdown`.
pub struct AnnouncementQueue {
    tx: Sender<Announcement>,
    rx: Receiver<Announcement>,
    /// Dropped on close; a disconnected `closed_rx` wakes a blocked consumer.
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
    closed: AtomicBool,
    dropped: AtomicU64,
    capacity: usize,
    policy: OverflowPolicy,
}

impl AnnouncementQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let (closed_tx, closed_rx) = bounded(0);
        Self {
            tx,
            rx,
            closed_tx: Mutex::new(Some(closed_tx)),
            closed_rx,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Append an announcement without blocking.
    pub fn enqueue(&self, announcement: Announcement) -> Result<Enqueued> {
        if self.is_closed() {
            return Ok(Enqueued::Closed(announcement));
        }
        let announcement = match self.tx.try_send(announcement) {
            Ok(()) => return Ok(Enqueued::Accepted),
            Err(TrySendError::Full(announcement)) => announcement,
            Err(TrySendError::Disconnected(announcement)) => {
                return Ok(Enqueued::Closed(announcement))
            }
        };

        let outcome = match self.policy {
            OverflowPolicy::DropNewest => Enqueued::Rejected(announcement),
            OverflowPolicy::DropOldest => {
                // The consumer may have freed a slot in the meantime; then nothing is evicted.
                let evicted = self.rx.try_recv().ok();
                match (self.tx.try_send(announcement), evicted) {
                    (Ok(()), Some(evicted)) => Enqueued::DisplacedOldest(evicted),
                    (Ok(()), None) => Enqueued::Accepted,
                    (Err(TrySendError::Full(announcement)), _) => Enqueued::Rejected(announcement),
                    (Err(TrySendError::Disconnected(announcement)), _) => {
                        Enqueued::Closed(announcement)
                    }
                }
            }
        };
        if matches!(outcome, Enqueued::DisplacedOldest(_) | Enqueued::Rejected(_)) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    /// Block until an item is available.
    pub fn dequeue(&self) -> Result<QueueItem> {
        select! {
            recv(self.rx) -> announcement => announcement
                .map(QueueItem::Speak)
                .map_err(|_| anyhow!("announcement queue disconnected")),
            recv(self.closed_rx) -> _ => Ok(self.drain_after_close()),
        }
    }

    /// Like `dequeue`, giving up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<QueueItem>> {
        select! {
            recv(self.rx) -> announcement => announcement
                .map(|announcement| Some(QueueItem::Speak(announcement)))
                .map_err(|_| anyhow!("announcement queue disconnected")),
            recv(self.closed_rx) -> _ => Ok(Some(self.drain_after_close())),
            default(timeout) => Ok(None),
        }
    }

    fn drain_after_close(&self) -> QueueItem {
        match self.rx.try_recv() {
            Ok(announcement) => QueueItem::Speak(announcement),
            Err(_) => QueueItem::Shutdown,
        }
    }

    /// Close the queue. Later enqueues are refused; the consumer drains what is
    /// pending and then sees the shutdown sentinel.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut closed_tx = self
            .closed_tx
            .lock()
            .map_err(|_| anyhow!("announcement queue lock poisoned"))?;
        closed_tx.take();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Announcements discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn announcement(text: &str) -> Announcement {
        Announcement::new(text, Instant::now())
    }

    fn speak_text(item: QueueItem) -> String {
        match item {
            QueueItem::Speak(a) => a.text,
            QueueItem::Shutdown => panic!("unexpected shutdown sentinel"),
        }
    }

    #[test]
    fn delivers_in_fifo_order() -> Result<()> {
        let queue = AnnouncementQueue::new(4, OverflowPolicy::DropOldest);
        queue.enqueue(announcement("A"))?;
        queue.enqueue(announcement("B"))?;
        assert_eq!(speak_text(queue.dequeue()?), "A");
        assert_eq!(speak_text(queue.dequeue()?), "B");
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn drop_oldest_evicts_stalest() -> Result<()> {
        let queue = AnnouncementQueue::new(2, OverflowPolicy::DropOldest);
        assert_eq!(queue.enqueue(announcement("A"))?, Enqueued::Accepted);
        assert_eq!(queue.enqueue(announcement("B"))?, Enqueued::Accepted);
        match queue.enqueue(announcement("C"))? {
            Enqueued::DisplacedOldest(evicted) => assert_eq!(evicted.text, "A"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(queue.dropped(), 1);
        assert_eq!(speak_text(queue.dequeue()?), "B");
        assert_eq!(speak_text(queue.dequeue()?), "C");
        Ok(())
    }

    #[test]
    fn drop_newest_keeps_queued_items() -> Result<()> {
        let queue = AnnouncementQueue::new(1, OverflowPolicy::DropNewest);
        queue.enqueue(announcement("A"))?;
        match queue.enqueue(announcement("B"))? {
            Enqueued::Rejected(rejected) => assert_eq!(rejected.text, "B"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(speak_text(queue.dequeue()?), "A");
        Ok(())
    }

    #[test]
    fn close_drains_pending_then_yields_sentinel() -> Result<()> {
        let queue = AnnouncementQueue::new(4, OverflowPolicy::DropOldest);
        queue.enqueue(announcement("A"))?;
        queue.close()?;
        assert!(matches!(
            queue.enqueue(announcement("late"))?,
            Enqueued::Closed(_)
        ));
        assert_eq!(speak_text(queue.dequeue()?), "A");
        assert_eq!(queue.dequeue()?, QueueItem::Shutdown);
        assert_eq!(queue.dequeue()?, QueueItem::Shutdown);
        Ok(())
    }

    #[test]
    fn dequeue_timeout_returns_none_when_idle() -> Result<()> {
        let queue = AnnouncementQueue::new(1, OverflowPolicy::DropOldest);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20))?, None);
        Ok(())
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = AnnouncementQueue::new(0, OverflowPolicy::DropNewest);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn policy_parses_from_config_strings() -> Result<()> {
        assert_eq!(
            "drop-newest".parse::<OverflowPolicy>()?,
            OverflowPolicy::DropNewest
        );
        assert_eq!(
            "Drop_Oldest".parse::<OverflowPolicy>()?,
            OverflowPolicy::DropOldest
        );
        assert!("lifo".parse::<OverflowPolicy>().is_err());
        Ok(())
    }
}
