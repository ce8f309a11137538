//! Select-and-speak pipeline
//!
//! Speak: capture the selection, then hand it to the speech session.
//! Stop: interrupt the speech session directly.

use tracing::{error, info};

use crate::capture::SelectionCapture;
use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::input::hotkey::{HotkeyGate, TriggerHandler};
use crate::input::keystroke::platform_injector;
use crate::speech::{SayCommand, SpeakStatus, SpeechParams, SpeechSession};

/// Outcome of one speak trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Selection captured and speech started
    Speaking,
    /// Nothing was selected; speech was not touched
    NothingSelected,
    /// Speech could not be started
    Failed,
}

/// Capture plus speech, shared with the hotkey listener thread
pub struct SpeakSelection {
    capture: SelectionCapture,
    speech: SpeechSession,
    params: SpeechParams,
}

impl SpeakSelection {
    /// Compose a pipeline from its parts
    #[must_use]
    pub fn new(capture: SelectionCapture, speech: SpeechSession, params: SpeechParams) -> Self {
        Self {
            capture,
            speech,
            params,
        }
    }

    /// System clipboard, platform key injection and the configured speech command
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let capture = SelectionCapture::new(
            Box::new(SystemClipboard::new()),
            platform_injector(),
            config.capture.timing(),
        );
        let speech = SpeechSession::new(Box::new(SayCommand::new(config.speech.command.clone())));
        Self::new(capture, speech, config.speech.params())
    }

    /// Speech session
    #[must_use]
    pub const fn speech(&self) -> &SpeechSession {
        &self.speech
    }

    /// Capture the current selection and speak it
    pub fn speak_selection(&self) -> SpeakOutcome {
        let text = self.capture.capture_selection();
        if text.trim().is_empty() {
            info!("no selection detected");
            return SpeakOutcome::NothingSelected;
        }

        match self.speech.speak(&text, &self.params) {
            Ok(SpeakStatus::Started) => SpeakOutcome::Speaking,
            Ok(SpeakStatus::NothingToSpeak) => SpeakOutcome::NothingSelected,
            Err(e) => {
                error!(error = %e, "failed to start speech");
                SpeakOutcome::Failed
            }
        }
    }

    /// Interrupt speech; returns `true` if something was speaking
    pub fn stop_speaking(&self) -> bool {
        self.speech.stop()
    }

    /// Final stop on quit or interrupt: silence speech, then release the hotkeys
    pub fn shutdown(&self, gate: &mut HotkeyGate) {
        if self.stop_speaking() {
            info!("speech stopped for shutdown");
        }
        gate.stop();
        info!("read4me stopped");
    }
}

impl TriggerHandler for SpeakSelection {
    fn on_speak(&self) {
        let outcome = self.speak_selection();
        info!(?outcome, "speak trigger handled");
    }

    fn on_stop(&self) {
        if !self.stop_speaking() {
            info!("stop: nothing was speaking");
        }
    }
}
