use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use super::SpeechSynthesizer;
use crate::announce::{AnnouncementQueue, QueueItem};

/// Worker lifecycle: `Waiting <-> Speaking`, then `Stopped` after the sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Waiting,
    Speaking,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Waiting,
            1 => WorkerState::Speaking,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Waiting => 0,
            WorkerState::Speaking => 1,
            WorkerState::Stopped => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerStats {
    pub state: WorkerState,
    pub spoken: u64,
    pub failed: u64,
}

#[derive(Default)]
struct WorkerStatus {
    state: AtomicU8,
    spoken: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStatus {
    fn set(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            state: WorkerState::from_u8(self.state.load(Ordering::SeqCst)),
            spoken: self.spoken.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// How `SpeechWorkerHandle::shutdown` ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker drained the queue, saw the sentinel and was joined.
    Joined,
    /// The worker was still busy at the deadline and has been detached.
    TimedOut,
}

/// Single consumer of the announcement queue.
pub struct SpeechWorker;

impl SpeechWorker {
    /// Start the worker thread. Call once per process.
    pub fn spawn(
        queue: Arc<AnnouncementQueue>,
        synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> Result<SpeechWorkerHandle> {
        let status = Arc::new(WorkerStatus::default());
        let (done_tx, done_rx) = bounded(1);
        let thread_queue = queue.clone();
        let thread_status = status.clone();
        let join = std::thread::Builder::new()
            .name("speech-worker".to_string())
            .spawn(move || {
                if let Err(err) = run_worker(&thread_queue, synthesizer, &thread_status) {
                    log::error!("speech worker stopped: {:#}", err);
                }
                thread_status.set(WorkerState::Stopped);
                let _ = done_tx.send(());
            })
            .context("failed to spawn speech worker thread")?;

        Ok(SpeechWorkerHandle {
            queue,
            status,
            done: done_rx,
            join: Some(join),
        })
    }
}

fn run_worker(
    queue: &AnnouncementQueue,
    mut synthesizer: Box<dyn SpeechSynthesizer>,
    status: &WorkerStatus,
) -> Result<()> {
    log::debug!("speech worker started ({})", synthesizer.name());
    loop {
        status.set(WorkerState::Waiting);
        let announcement = match queue.dequeue()? {
            QueueItem::Speak(announcement) => announcement,
            QueueItem::Shutdown => break,
        };
        status.set(WorkerState::Speaking);
        log::debug!(
            "speaking after {} ms in queue: {}",
            announcement.waited_ms(),
            announcement.text
        );
        match synthesizer.speak(&announcement.text) {
            Ok(()) => {
                status.spoken.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                status.failed.fetch_add(1, Ordering::SeqCst);
                log::warn!(
                    "speech failed, dropping announcement '{}': {:#}",
                    announcement.text,
                    err
                );
            }
        }
    }
    log::debug!("speech worker received shutdown sentinel");
    Ok(())
}

/// Owner's handle on the worker thread.
///
/// Dropping the handle without calling `shutdown` closes the queue so the
/// worker exits on its own, but does not wait for it.
pub struct SpeechWorkerHandle {
    queue: Arc<AnnouncementQueue>,
    status: Arc<WorkerStatus>,
    done: Receiver<()>,
    join: Option<JoinHandle<()>>,
}

impl SpeechWorkerHandle {
    pub fn queue(&self) -> &Arc<AnnouncementQueue> {
        &self.queue
    }

    pub fn state(&self) -> WorkerState {
        self.status.snapshot().state
    }

    pub fn stats(&self) -> WorkerStats {
        self.status.snapshot()
    }

    /// Send the sentinel and wait up to `timeout` for the worker to finish.
    ///
    /// Announcements already queued are still spoken within the deadline.
    pub fn shutdown(mut self, timeout: Duration) -> Result<ShutdownOutcome> {
        self.queue.close()?;
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(join) = self.join.take() {
                    join.join()
                        .map_err(|_| anyhow!("speech worker thread panicked"))?;
                }
                Ok(ShutdownOutcome::Joined)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "speech worker still busy after {} ms; detaching ({} announcements pending)",
                    timeout.as_millis(),
                    self.queue.len()
                );
                self.join.take();
                Ok(ShutdownOutcome::TimedOut)
            }
        }
    }
}

impl Drop for SpeechWorkerHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.queue.close();
        }
    }
}
