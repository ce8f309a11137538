//! Speech output through an external synthesizer process
//!
//! At most one speech process is alive per session. Starting new speech
//! terminates the previous process first, under the same lock as `stop`.

use std::io::{self, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::telemetry::text_preview;

/// How long a terminated process gets to exit before it is killed
const TERMINATE_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Synthesis parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechParams {
    /// Speaking rate in words per minute
    pub rate_wpm: u32,
    /// Voice name (None = system default)
    pub voice: Option<String>,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            rate_wpm: 190,
            voice: None,
        }
    }
}

/// Non-empty text plus the parameters to speak it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    text: String,
    params: SpeechParams,
}

impl SpeechRequest {
    /// Build a request from raw text; `None` if the text is blank
    #[must_use]
    pub fn new(text: &str, params: &SpeechParams) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_owned(),
            params: params.clone(),
        })
    }

    /// Trimmed text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Synthesis parameters
    #[must_use]
    pub const fn params(&self) -> &SpeechParams {
        &self.params
    }
}

/// Errors starting speech
#[derive(Debug, Error)]
pub enum SpeechError {
    /// The speech command could not be started
    #[error("failed to start speech command `{command}`: {source}")]
    Spawn {
        /// Program name
        command: String,
        /// Underlying error
        source: io::Error,
    },

    /// Feeding text to the speech command failed
    #[error("failed to send text to speech command: {0}")]
    Write(#[source] io::Error),
}

/// A running speech process
pub trait SpeechProcess: Send {
    /// Whether the process has finished; polls without blocking
    fn has_exited(&mut self) -> bool;

    /// Stop the process and reap it
    ///
    /// # Errors
    /// Returns error if the process could not be signalled or waited on
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts speech processes
pub trait SpeechBackend: Send + Sync {
    /// Start speaking `request`; the returned process exits on its own when done
    ///
    /// # Errors
    /// Returns error if the process cannot be started or fed
    fn spawn(&self, request: &SpeechRequest) -> Result<Box<dyn SpeechProcess>, SpeechError>;
}

/// The macOS `say` command, reading text from stdin
#[derive(Debug, Clone)]
pub struct SayCommand {
    program: String,
}

impl SayCommand {
    /// Use `program` as the speech command
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for `params`
    #[must_use]
    pub fn args(params: &SpeechParams) -> Vec<String> {
        let mut args = vec!["-r".to_owned(), params.rate_wpm.to_string()];
        if let Some(voice) = &params.voice {
            args.push("-v".to_owned());
            args.push(voice.clone());
        }
        args
    }
}

impl Default for SayCommand {
    fn default() -> Self {
        Self::new("say")
    }
}

impl SpeechBackend for SayCommand {
    fn spawn(&self, request: &SpeechRequest) -> Result<Box<dyn SpeechProcess>, SpeechError> {
        let mut child = Command::new(&self.program)
            .args(Self::args(request.params()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        debug!(pid = child.id(), command = %self.program, "speech process started");

        // Text goes through stdin to avoid argument length and quoting limits.
        // Closing stdin lets the command start speaking and exit when done.
        let written = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("stdin not captured"))
            .and_then(|mut stdin| stdin.write_all(request.text().as_bytes()));

        let mut process = SayProcess { child };
        if let Err(e) = written {
            if let Err(kill_err) = process.terminate() {
                debug!(error = %kill_err, "failed to terminate unfed speech process");
            }
            return Err(SpeechError::Write(e));
        }

        Ok(Box::new(process))
    }
}

struct SayProcess {
    child: Child,
}

impl SayProcess {
    #[cfg(unix)]
    fn signal_terminate(&self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(self.child.id()).map_err(io::Error::other)?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn wait_with_grace(&mut self) -> io::Result<()> {
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        warn!(pid = self.child.id(), "speech process ignored SIGTERM, killing");
        self.child.kill()?;
        self.child.wait().map(|_| ())
    }
}

impl SpeechProcess for SayProcess {
    fn has_exited(&mut self) -> bool {
        // An unpollable child is as good as gone
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        self.signal_terminate()?;
        self.wait_with_grace()
    }
}

/// Outcome of [`SpeechSession::speak`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStatus {
    /// A new speech process is running
    Started,
    /// The text was blank; nothing was started or stopped
    NothingToSpeak,
}

/// Owns the single live speech process
pub struct SpeechSession {
    backend: Box<dyn SpeechBackend>,
    current: Mutex<Option<Box<dyn SpeechProcess>>>,
}

impl SpeechSession {
    /// Create an idle session
    #[must_use]
    pub fn new(backend: Box<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SpeechProcess>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Speak `text`, replacing any speech in progress
    ///
    /// Blank text is a no-op and leaves current speech untouched.
    ///
    /// # Errors
    /// Returns error if the speech command cannot be started; any previous
    /// speech has already been stopped at that point
    pub fn speak(&self, text: &str, params: &SpeechParams) -> Result<SpeakStatus, SpeechError> {
        let Some(request) = SpeechRequest::new(text, params) else {
            info!("nothing to speak");
            return Ok(SpeakStatus::NothingToSpeak);
        };

        let mut current = self.lock();
        Self::stop_locked(&mut current);

        *current = Some(self.backend.spawn(&request)?);

        info!(
            text_len = request.text().len(),
            text_preview = %text_preview(request.text()),
            rate_wpm = params.rate_wpm,
            voice = ?params.voice,
            "speaking"
        );
        Ok(SpeakStatus::Started)
    }

    /// Stop speech in progress
    ///
    /// Idempotent. Returns `true` if a live process was terminated.
    pub fn stop(&self) -> bool {
        let mut current = self.lock();
        Self::stop_locked(&mut current)
    }

    /// Whether speech is in progress; clears a naturally finished process
    pub fn is_speaking(&self) -> bool {
        let mut current = self.lock();
        let finished = match current.as_mut() {
            Some(process) => process.has_exited(),
            None => return false,
        };
        if finished {
            debug!("speech finished");
            *current = None;
        }
        !finished
    }

    fn stop_locked(current: &mut Option<Box<dyn SpeechProcess>>) -> bool {
        let Some(mut process) = current.take() else {
            debug!("stop: nothing speaking");
            return false;
        };

        if process.has_exited() {
            debug!("stop: speech had already finished");
            return false;
        }

        // Already-exited races are expected here
        if let Err(e) = process.terminate() {
            debug!(error = %e, "failed to terminate speech process");
        }
        info!("speech stopped");
        true
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        Self::stop_locked(self.current.get_mut().unwrap_or_else(PoisonError::into_inner));
    }
}
