use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use vigil::{
    Announcement, AnnouncementGate, AnnouncementQueue, OverflowPolicy, ShutdownOutcome,
    SpeechSynthesizer, SpeechWorker, VoiceAlerts, VoiceOutcome, WorkerState,
};

/// Records every utterance; optionally slow, optionally failing on one phrase.
struct RecordingSynth {
    spoken: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail_on: Option<String>,
}

impl RecordingSynth {
    fn new(spoken: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            spoken,
            delay: Duration::ZERO,
            fail_on: None,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }
}

impl SpeechSynthesizer for RecordingSynth {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_on.as_deref() == Some(text) {
            return Err(anyhow!("audio device busy"));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn queue(capacity: usize) -> Arc<AnnouncementQueue> {
    Arc::new(AnnouncementQueue::new(capacity, OverflowPolicy::DropOldest))
}

#[test]
fn speaks_in_fifo_order_and_joins_on_shutdown() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let queue = queue(8);
    let worker = SpeechWorker::spawn(
        queue.clone(),
        Box::new(RecordingSynth::new(spoken.clone())),
    )
    .expect("spawn worker");

    let now = Instant::now();
    for text in ["Alert: boat detected", "Alert: person detected", "Alert: car detected"] {
        assert!(queue
            .enqueue(Announcement::new(text, now))
            .expect("enqueue")
            .is_accepted());
    }

    let outcome = worker
        .shutdown(Duration::from_secs(5))
        .expect("shutdown worker");
    assert_eq!(outcome, ShutdownOutcome::Joined);
    assert_eq!(
        *spoken.lock().unwrap(),
        vec![
            "Alert: boat detected".to_string(),
            "Alert: person detected".to_string(),
            "Alert: car detected".to_string(),
        ]
    );
}

#[test]
fn enqueue_does_not_wait_for_slow_speech() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let queue = queue(4);
    let worker = SpeechWorker::spawn(
        queue.clone(),
        Box::new(RecordingSynth::new(spoken.clone()).slow(Duration::from_millis(300))),
    )
    .expect("spawn worker");

    let started = Instant::now();
    for text in ["one", "two", "three"] {
        queue
            .enqueue(Announcement::new(text, Instant::now()))
            .expect("enqueue");
    }
    assert!(
        started.elapsed() < Duration::from_millis(150),
        "enqueue blocked for {:?}",
        started.elapsed()
    );

    worker
        .shutdown(Duration::from_secs(5))
        .expect("shutdown worker");
    assert_eq!(spoken.lock().unwrap().len(), 3);
}

#[test]
fn failed_utterance_is_dropped_and_worker_continues() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let queue = queue(4);
    let worker = SpeechWorker::spawn(
        queue.clone(),
        Box::new(RecordingSynth::new(spoken.clone()).failing_on("broken")),
    )
    .expect("spawn worker");

    for text in ["first", "broken", "last"] {
        queue
            .enqueue(Announcement::new(text, Instant::now()))
            .expect("enqueue");
    }

    // Wait for the worker to drain before reading counters.
    let deadline = Instant::now() + Duration::from_secs(5);
    while worker.stats().spoken + worker.stats().failed < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let stats = worker.stats();
    assert_eq!(stats.spoken, 2);
    assert_eq!(stats.failed, 1);

    assert_eq!(
        worker
            .shutdown(Duration::from_secs(5))
            .expect("shutdown worker"),
        ShutdownOutcome::Joined
    );
    assert_eq!(
        *spoken.lock().unwrap(),
        vec!["first".to_string(), "last".to_string()]
    );
}

#[test]
fn shutdown_times_out_while_worker_is_speaking() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let queue = queue(4);
    let worker = SpeechWorker::spawn(
        queue.clone(),
        Box::new(RecordingSynth::new(spoken).slow(Duration::from_millis(800))),
    )
    .expect("spawn worker");

    queue
        .enqueue(Announcement::new("long phrase", Instant::now()))
        .expect("enqueue");
    let deadline = Instant::now() + Duration::from_secs(2);
    while worker.state() != WorkerState::Speaking && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    let outcome = worker
        .shutdown(Duration::from_millis(50))
        .expect("shutdown worker");
    assert_eq!(outcome, ShutdownOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(queue.is_closed());
}

#[test]
fn voice_alerts_feed_the_worker_through_the_gate() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let queue = queue(4);
    let worker = SpeechWorker::spawn(
        queue.clone(),
        Box::new(RecordingSynth::new(spoken.clone())),
    )
    .expect("spawn worker");
    let mut voice = VoiceAlerts::new(
        "Alert: {labels} detected",
        AnnouncementGate::new(Duration::from_secs(5)),
        queue,
    )
    .expect("voice alerts");

    let t0 = Instant::now();
    assert!(voice.offer("boat", t0).expect("offer").is_queued());
    assert_eq!(
        voice
            .offer("boat", t0 + Duration::from_secs(1))
            .expect("offer"),
        VoiceOutcome::Suppressed {
            text: "Alert: boat detected".to_string()
        }
    );
    assert!(voice
        .offer("boat", t0 + Duration::from_secs(5))
        .expect("offer")
        .is_queued());

    worker
        .shutdown(Duration::from_secs(5))
        .expect("shutdown worker");
    assert_eq!(
        *spoken.lock().unwrap(),
        vec![
            "Alert: boat detected".to_string(),
            "Alert: boat detected".to_string(),
        ]
    );
}
