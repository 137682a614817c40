//! Speech synthesis.
//!
//! Synthesis is serial: the engine speaks one utterance to completion before
//! the next one starts. `SpeechWorker` owns the engine on its own thread and
//! drains the announcement queue; the detection loop never waits on it.

mod command;
mod worker;

use anyhow::Result;

pub use command::{build_synthesizer, CommandSynthesizer, SpeechConfig, SpeechEngine};
pub use worker::{ShutdownOutcome, SpeechWorker, SpeechWorkerHandle, WorkerState, WorkerStats};

/// A text-to-speech engine.
pub trait SpeechSynthesizer: Send {
    fn name(&self) -> &'static str;

    /// Speak `text`, returning once the utterance has finished. An error means
    /// the utterance was not (fully) spoken; callers drop it and move on.
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Fallback engine that only logs what would have been said.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSynthesizer;

impl SpeechSynthesizer for LogSynthesizer {
    fn name(&self) -> &'static str {
        "log"
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        log::info!("[speech] {}", text);
        Ok(())
    }
}
