//! System clipboard access
//!
//! The clipboard is a shared global resource. Only the selection capture
//! writes to it, and it always puts the previous text back.

use thiserror::Error;
use tracing::debug;

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Could not open the platform clipboard
    #[error("failed to open clipboard: {0}")]
    Open(String),

    /// Reading text failed
    #[error("failed to read clipboard: {0}")]
    Read(String),

    /// Writing text failed
    #[error("failed to write clipboard: {0}")]
    Write(String),
}

/// Text clipboard collaborator
pub trait Clipboard: Send {
    /// Current text content. An empty clipboard reads as `""`.
    ///
    /// # Errors
    /// Returns error if the platform clipboard is unavailable
    fn read(&mut self) -> Result<String, ClipboardError>;

    /// Replace the clipboard content with `text`
    ///
    /// # Errors
    /// Returns error if the platform clipboard is unavailable
    fn write(&mut self, text: &str) -> Result<(), ClipboardError>;

    /// Empty the clipboard
    ///
    /// # Errors
    /// Returns error if the platform clipboard is unavailable
    fn clear(&mut self) -> Result<(), ClipboardError> {
        self.write("")
    }
}

/// Platform clipboard backed by `arboard`
///
/// A fresh handle is opened per call; holding one open across the copy
/// keystroke keeps stale ownership on some platforms.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Create a new system clipboard accessor
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open() -> Result<arboard::Clipboard, ClipboardError> {
        arboard::Clipboard::new().map_err(|e| ClipboardError::Open(e.to_string()))
    }
}

impl Clipboard for SystemClipboard {
    fn read(&mut self) -> Result<String, ClipboardError> {
        match Self::open()?.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => {
                debug!("clipboard holds no text");
                Ok(String::new())
            }
            Err(e) => Err(ClipboardError::Read(e.to_string())),
        }
    }

    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        Self::open()?
            .set_text(text)
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }

    fn clear(&mut self) -> Result<(), ClipboardError> {
        Self::open()?
            .clear()
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }
}
