//! Boundary to the external speech-to-phoneme recognizer.
//!
//! The recognizer itself is a black box: it receives a wave file and a
//! transcript and answers with a JSON document listing the phonemes of every
//! word together with their start times in hundredths of a second.

use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::{FrameRate, LipSyncError, RecognizerConfig, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Extra time granted to a recognizer to report its own timeout.
const REAP_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOutput {
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub phonemes: Vec<PhonemeHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhonemeHit {
    pub phoneme: String,
    /// Start time in hundredths of a second from the beginning of the audio.
    pub start: i64,
}

impl RecognitionOutput {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(LipSyncError::RecognitionFailure(
                "recognizer returned no output".to_string(),
            ));
        }
        serde_json::from_str(raw)
            .map_err(|err| LipSyncError::RecognitionFailure(format!("unusable output: {err}")))
    }

    pub fn phoneme_count(&self) -> usize {
        self.words.iter().map(|word| word.phonemes.len()).sum()
    }

    /// `(label, frame)` pairs in recognizer order, placed relative to
    /// `offset`, the first frame of the audio clip.
    pub fn marker_events(&self, rate: FrameRate, offset: i64) -> Vec<(String, i64)> {
        self.words
            .iter()
            .flat_map(|word| &word.phonemes)
            .map(|hit| {
                let frame = offset + rate.frame_for_start(hit.start);
                (hit.phoneme.clone(), frame)
            })
            .collect()
    }

    /// Last start time in frames relative to the clip start.
    pub fn last_frame(&self, rate: FrameRate) -> Option<i64> {
        self.words
            .iter()
            .flat_map(|word| &word.phonemes)
            .map(|hit| rate.frame_for_start(hit.start))
            .max()
    }
}

/// Anything able to turn speech into the recognizer JSON document.
pub trait Recognizer: Send + Sync {
    /// Recognizes `wave` against `transcript`, giving up once `timeout` has
    /// elapsed and releasing whatever resources the attempt holds.
    fn recognize(&self, wave: &Path, transcript: &Path, timeout: Duration) -> Result<String>;
}

/// Runs the recognizer as an external program:
/// `<program> [args..] <wave> <transcript>`, reading JSON from stdout.
#[derive(Debug)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    resolved: OnceCell<PathBuf>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            resolved: OnceCell::new(),
        }
    }

    pub fn from_config(config: &RecognizerConfig) -> Result<Self> {
        let program = config
            .program
            .clone()
            .ok_or_else(|| LipSyncError::config("no recognizer program configured"))?;
        Ok(Self::new(program, config.args.clone()))
    }

    /// Resolves the program on first use, searching `PATH` for bare names.
    /// A missing or non-executable program is a configuration error.
    pub fn program(&self) -> Result<&Path> {
        self.resolved
            .get_or_try_init(|| {
                which::which(&self.program).map_err(|err| {
                    LipSyncError::config(format!(
                        "recognizer `{}` not found: {err}",
                        self.program.display()
                    ))
                })
            })
            .map(PathBuf::as_path)
    }
}

impl Recognizer for CommandRecognizer {
    fn recognize(&self, wave: &Path, transcript: &Path, timeout: Duration) -> Result<String> {
        let program = self.program()?;
        tracing::info!(program = %program.display(), wave = %wave.display(), "running recognizer");

        let mut child = Command::new(program)
            .args(&self.args)
            .arg(wave)
            .arg(transcript)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = wait_until(&mut child, Instant::now() + timeout)? else {
            if let Err(err) = child.kill() {
                tracing::warn!(%err, "failed to kill recognizer");
            }
            child.wait()?;
            tracing::warn!(?timeout, "recognizer timed out and was killed");
            return Err(LipSyncError::RecognitionTimeout(timeout));
        };

        let stdout = collect(stdout)?;
        if !status.success() {
            let stderr = collect(stderr)?;
            return Err(LipSyncError::RecognitionFailure(format!(
                "recognizer exited with {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let stdout = String::from_utf8(stdout).map_err(|_| {
            LipSyncError::RecognitionFailure("recognizer output is not UTF-8".to_string())
        })?;
        if stdout.trim().is_empty() {
            return Err(LipSyncError::RecognitionFailure(
                "couldn't parse speech".to_string(),
            ));
        }
        Ok(stdout)
    }
}

/// Reads a child pipe to its end on a separate thread so neither pipe can
/// fill up and stall the child.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let bytes = reader.join().map_err(|_| {
        LipSyncError::RecognitionFailure("recognizer output reader panicked".to_string())
    })??;
    Ok(bytes)
}

/// Waits for `child` to exit. `None` means `deadline` passed first.
fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Replays recognizer output captured earlier.
#[derive(Debug, Clone)]
pub struct FileRecognizer {
    path: PathBuf,
}

impl FileRecognizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Recognizer for FileRecognizer {
    fn recognize(&self, _wave: &Path, _transcript: &Path, _timeout: Duration) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|err| {
            LipSyncError::RecognitionFailure(format!(
                "cannot read `{}`: {err}",
                self.path.display()
            ))
        })
    }
}

/// Runs `recognizer` on a worker thread and hands its answer back to the
/// caller. Recognizers enforce `timeout` themselves; the caller stops waiting
/// shortly after it in case one does not, and drops any late answer.
pub fn recognize_with_timeout(
    recognizer: Arc<dyn Recognizer>,
    wave: &Path,
    transcript: &Path,
    timeout: Duration,
) -> Result<RecognitionOutput> {
    let (tx, rx) = mpsc::channel();
    let wave = wave.to_path_buf();
    let transcript = transcript.to_path_buf();

    thread::Builder::new()
        .name("recognizer".to_string())
        .spawn(move || {
            let _ = tx.send(recognizer.recognize(&wave, &transcript, timeout));
        })?;

    match rx.recv_timeout(timeout + REAP_GRACE) {
        Ok(raw) => RecognitionOutput::parse(&raw?),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(LipSyncError::RecognitionTimeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(LipSyncError::RecognitionFailure(
            "recognizer worker stopped without an answer".to_string(),
        )),
    }
}
