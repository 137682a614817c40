use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::{LogSynthesizer, SpeechSynthesizer};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

static UTTERANCE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Which engine to speak with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpeechEngine {
    /// Piper if a binary and voice model are found, else espeak-ng, else log.
    #[default]
    Auto,
    Piper,
    Espeak,
    Log,
}

impl SpeechEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechEngine::Auto => "auto",
            SpeechEngine::Piper => "piper",
            SpeechEngine::Espeak => "espeak-ng",
            SpeechEngine::Log => "log",
        }
    }
}

impl FromStr for SpeechEngine {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SpeechEngine::Auto),
            "piper" => Ok(SpeechEngine::Piper),
            "espeak" | "espeak-ng" => Ok(SpeechEngine::Espeak),
            "log" | "none" => Ok(SpeechEngine::Log),
            other => Err(anyhow!(
                "unknown speech engine '{}' (expected auto, piper, espeak-ng or log)",
                other
            )),
        }
    }
}

/// Engine settings.
#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub engine: SpeechEngine,
    /// Words per minute.
    pub rate: u32,
    /// 0.0..=2.0, 1.0 being the engine default.
    pub volume: f32,
    /// espeak voice code (e.g. "en-us").
    pub voice: Option<String>,
    /// Per-utterance limit; exceeding it kills the engine process.
    pub utterance_timeout: Duration,
    pub espeak_bin: Option<PathBuf>,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    /// WAV player used for piper output (aplay, paplay, ffplay).
    pub player: Option<PathBuf>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechEngine::Auto,
            rate: 180,
            volume: 1.0,
            voice: None,
            utterance_timeout: Duration::from_secs(20),
            espeak_bin: get_from_env_or_path("ESPEAK_BIN", "espeak-ng")
                .or_else(|| get_from_path("espeak")),
            piper_bin: get_from_env_or_path("PIPER_BIN", "piper"),
            piper_voice: std::env::var("PIPER_VOICE").ok().map(PathBuf::from),
            player: get_from_path("aplay")
                .or_else(|| get_from_path("paplay"))
                .or_else(|| get_from_path("ffplay")),
        }
    }
}

/// Build the synthesizer selected by `config`.
///
/// `Auto` degrades to the log engine when nothing is installed; an explicitly
/// requested engine that cannot be found is an error.
pub fn build_synthesizer(config: &SpeechConfig) -> Result<Box<dyn SpeechSynthesizer>> {
    let synth: Box<dyn SpeechSynthesizer> = match config.engine {
        SpeechEngine::Log => Box::new(LogSynthesizer),
        SpeechEngine::Piper => Box::new(CommandSynthesizer::piper(config)?),
        SpeechEngine::Espeak => Box::new(CommandSynthesizer::espeak(config)?),
        SpeechEngine::Auto => {
            if let Ok(piper) = CommandSynthesizer::piper(config) {
                Box::new(piper)
            } else if let Ok(espeak) = CommandSynthesizer::espeak(config) {
                Box::new(espeak)
            } else {
                log::warn!("no speech engine found (piper/espeak-ng missing); logging announcements only");
                Box::new(LogSynthesizer)
            }
        }
    };
    log::info!("speech engine: {}", synth.name());
    Ok(synth)
}

enum Backend {
    Espeak {
        bin: PathBuf,
    },
    Piper {
        bin: PathBuf,
        voice: PathBuf,
        player: PathBuf,
    },
}

/// Speaks through an external engine process, one process per utterance.
pub struct CommandSynthesizer {
    backend: Backend,
    rate: u32,
    volume: f32,
    voice: Option<String>,
    timeout: Duration,
}

impl CommandSynthesizer {
    pub fn espeak(config: &SpeechConfig) -> Result<Self> {
        let bin = config
            .espeak_bin
            .clone()
            .ok_or_else(|| anyhow!("espeak-ng not found (set ESPEAK_BIN or install espeak-ng)"))?;
        Ok(Self::with_backend(Backend::Espeak { bin }, config))
    }

    pub fn piper(config: &SpeechConfig) -> Result<Self> {
        let bin = config
            .piper_bin
            .clone()
            .ok_or_else(|| anyhow!("piper not found (set PIPER_BIN or install piper)"))?;
        let voice = config
            .piper_voice
            .clone()
            .ok_or_else(|| anyhow!("piper requires a voice model (set PIPER_VOICE)"))?;
        let player = config
            .player
            .clone()
            .ok_or_else(|| anyhow!("piper requires a WAV player (aplay, paplay or ffplay)"))?;
        Ok(Self::with_backend(Backend::Piper { bin, voice, player }, config))
    }

    fn with_backend(backend: Backend, config: &SpeechConfig) -> Self {
        Self {
            backend,
            rate: config.rate,
            volume: config.volume.clamp(0.0, 2.0),
            voice: config.voice.clone(),
            timeout: config.utterance_timeout,
        }
    }

    fn speak_espeak(&self, bin: &Path, text: &str) -> Result<()> {
        let mut cmd = Command::new(bin);
        cmd.arg("-s")
            .arg(self.rate.to_string())
            .arg("-a")
            .arg(((self.volume * 100.0).round() as u32).to_string());
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("--").arg(text);
        run_with_timeout(cmd, None, self.timeout)
    }

    fn speak_piper(&self, bin: &Path, voice: &Path, player: &Path, text: &str) -> Result<()> {
        let wav_path = std::env::temp_dir().join(format!(
            "vigil_tts_{}_{}.wav",
            std::process::id(),
            UTTERANCE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let started = Instant::now();

        // Piper's length scale is inverse speed; 180 wpm is treated as 1.0.
        let length_scale = 180.0 / self.rate.max(1) as f32;
        let mut synth = Command::new(bin);
        synth
            .arg("--model")
            .arg(voice)
            .arg("--output_file")
            .arg(&wav_path)
            .arg("--length_scale")
            .arg(format!("{:.2}", length_scale));
        let result = run_with_timeout(synth, Some(text), self.timeout).and_then(|()| {
            let remaining = self.timeout.saturating_sub(started.elapsed());
            let mut play = Command::new(player);
            if player.ends_with("ffplay") {
                play.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]);
            }
            play.arg(&wav_path);
            run_with_timeout(play, None, remaining)
        });
        let _ = std::fs::remove_file(&wav_path);
        result
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn name(&self) -> &'static str {
        match self.backend {
            Backend::Espeak { .. } => "espeak-ng",
            Backend::Piper { .. } => "piper",
        }
    }

    fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        match &self.backend {
            Backend::Espeak { bin } => self.speak_espeak(bin, text),
            Backend::Piper { bin, voice, player } => self.speak_piper(bin, voice, player, text),
        }
    }
}

fn run_with_timeout(mut cmd: Command, stdin: Option<&str>, timeout: Duration) -> Result<()> {
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;
    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            if let Err(err) = pipe.write_all(input.as_bytes()) {
                drop(pipe);
                stop_child(&mut child);
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to write text to {}", program)));
            }
        }
    }
    wait_with_deadline(&mut child, &program, Instant::now() + timeout)
}

/// Kill and reap `child` so no zombie is left behind.
fn stop_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn wait_with_deadline(child: &mut Child, program: &str, deadline: Instant) -> Result<()> {
    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to wait for {}", program))?
        {
            if status.success() {
                return Ok(());
            }
            return Err(anyhow!("{} exited with {}", program, status));
        }
        if Instant::now() >= deadline {
            stop_child(child);
            return Err(anyhow!("{} timed out; engine busy or stuck", program));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_engines() -> SpeechConfig {
        SpeechConfig {
            espeak_bin: None,
            piper_bin: None,
            piper_voice: None,
            player: None,
            ..SpeechConfig::default()
        }
    }

    #[test]
    fn engine_names_parse() -> Result<()> {
        assert_eq!("espeak".parse::<SpeechEngine>()?, SpeechEngine::Espeak);
        assert_eq!("Piper".parse::<SpeechEngine>()?, SpeechEngine::Piper);
        assert_eq!("none".parse::<SpeechEngine>()?, SpeechEngine::Log);
        assert!("festival".parse::<SpeechEngine>().is_err());
        Ok(())
    }

    #[test]
    fn auto_falls_back_to_log() -> Result<()> {
        let synth = build_synthesizer(&no_engines())?;
        assert_eq!(synth.name(), "log");
        Ok(())
    }

    #[test]
    fn explicit_engine_must_exist() {
        let config = SpeechConfig {
            engine: SpeechEngine::Espeak,
            ..no_engines()
        };
        assert!(build_synthesizer(&config).is_err());
    }

    #[test]
    fn piper_needs_voice_model() {
        let config = SpeechConfig {
            piper_bin: Some(PathBuf::from("/usr/bin/piper")),
            player: Some(PathBuf::from("/usr/bin/aplay")),
            ..no_engines()
        };
        let err = CommandSynthesizer::piper(&config).err().map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("voice model"));
    }

    #[cfg(unix)]
    #[test]
    fn engine_process_failure_is_reported() {
        let config = SpeechConfig {
            espeak_bin: Some(PathBuf::from("false")),
            ..no_engines()
        };
        let mut synth = CommandSynthesizer::espeak(&config).expect("espeak synth");
        assert!(synth.speak("hello").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn stuck_engine_is_killed_at_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_with_timeout(cmd, None, Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    /// Zombie children of this process whose command name is `comm`.
    #[cfg(target_os = "linux")]
    fn zombie_children(comm: &str) -> usize {
        let own_pid = std::process::id().to_string();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| std::fs::read_to_string(entry.path().join("stat")).ok())
            .filter(|stat| {
                // "<pid> (<comm>) <state> <ppid> ..."
                let Some((head, rest)) = stat.rsplit_once(") ") else {
                    return false;
                };
                let name = head.split_once(" (").map(|(_, name)| name);
                let mut fields = rest.split_whitespace();
                let state = fields.next();
                let ppid = fields.next();
                name == Some(comm) && state == Some("Z") && ppid == Some(own_pid.as_str())
            })
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn engine_exiting_before_reading_text_is_reaped() {
        // `true` exits without reading stdin, so writing a large text fails with EPIPE.
        let text = "x".repeat(4 * 1024 * 1024);
        for _ in 0..3 {
            let err = run_with_timeout(Command::new("true"), Some(&text), Duration::from_secs(2))
                .unwrap_err();
            assert!(err.to_string().contains("failed to write text"));
        }
        assert_eq!(zombie_children("true"), 0);
    }
}
