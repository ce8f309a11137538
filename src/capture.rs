//! Selection capture through the clipboard
//!
//! The selected text of the foreground app is only reachable by asking it to
//! copy. Capture wraps that copy in a clipboard snapshot so the user's own
//! clipboard content survives every capture, successful or not.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clipboard::Clipboard;
use crate::input::keystroke::{send_copy, KeyInjector};
use crate::telemetry::text_preview;

/// Delays around the copy keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Before sending ⌘C, so the hotkey's own modifiers are released
    pub settle: Duration,
    /// After ⌘C, for the foreground app to fill the clipboard
    pub capture: Duration,
    /// Before the single re-read when the first read is empty
    pub retry: Duration,
}

impl CaptureTiming {
    /// No delays at all (tests, scripted clipboards)
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            capture: Duration::ZERO,
            retry: Duration::ZERO,
        }
    }
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
            capture: Duration::from_millis(300),
            retry: Duration::from_millis(200),
        }
    }
}

/// Prior clipboard text, put back when the snapshot is dropped
///
/// Restoration is best-effort and runs on every exit path of the capture.
pub struct ClipboardSnapshot<'a> {
    clipboard: &'a mut dyn Clipboard,
    saved: String,
}

impl<'a> ClipboardSnapshot<'a> {
    /// Save the current clipboard text; an unreadable clipboard saves as empty
    pub fn take(clipboard: &'a mut dyn Clipboard) -> Self {
        let saved = read_or_empty(clipboard);
        debug!(saved_len = saved.len(), "clipboard snapshot taken");
        Self { clipboard, saved }
    }

    /// Text that will be restored
    #[must_use]
    pub fn saved(&self) -> &str {
        &self.saved
    }

    /// The clipboard underneath the snapshot
    pub fn clipboard(&mut self) -> &mut (dyn Clipboard + 'a) {
        &mut *self.clipboard
    }
}

impl Drop for ClipboardSnapshot<'_> {
    fn drop(&mut self) {
        let restored = if self.saved.is_empty() {
            self.clipboard.clear()
        } else {
            self.clipboard.write(&self.saved)
        };
        match restored {
            Ok(()) => debug!("clipboard restored"),
            Err(e) => warn!(error = %e, "failed to restore clipboard"),
        }
    }
}

fn read_or_empty(clipboard: &mut dyn Clipboard) -> String {
    clipboard.read().unwrap_or_else(|e| {
        debug!(error = %e, "clipboard read failed, treating as empty");
        String::new()
    })
}

/// Copies the current selection of the foreground app
pub struct SelectionCapture {
    clipboard: Mutex<Box<dyn Clipboard>>,
    keys: Box<dyn KeyInjector>,
    timing: CaptureTiming,
}

impl SelectionCapture {
    /// Create a capture over the given collaborators
    #[must_use]
    pub fn new(
        clipboard: Box<dyn Clipboard>,
        keys: Box<dyn KeyInjector>,
        timing: CaptureTiming,
    ) -> Self {
        Self {
            clipboard: Mutex::new(clipboard),
            keys,
            timing,
        }
    }

    /// Capture the selected text
    ///
    /// Never fails: OS errors degrade to an empty result. The clipboard holds
    /// its prior text again when this returns. Blocks the calling thread for the
    /// configured delays.
    pub fn capture_selection(&self) -> String {
        // Held for the whole cycle so two captures never interleave snapshots
        let mut clipboard = self.clipboard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = ClipboardSnapshot::take(&mut **clipboard);

        // Clear first so a stale clipboard is never mistaken for the selection
        if let Err(e) = snapshot.clipboard().clear() {
            debug!(error = %e, "failed to clear clipboard before copy");
        }

        thread::sleep(self.timing.settle);

        if let Err(e) = send_copy(self.keys.as_ref()) {
            warn!(error = %e, "failed to send copy keystroke");
            return String::new();
        }

        thread::sleep(self.timing.capture);

        let mut text = read_or_empty(snapshot.clipboard());
        if text.trim().is_empty() {
            debug!(
                retry_ms = self.timing.retry.as_millis(),
                "clipboard still empty, retrying once"
            );
            thread::sleep(self.timing.retry);
            text = read_or_empty(snapshot.clipboard());
        }

        drop(snapshot);

        if text.trim().is_empty() {
            info!("no selection captured");
        } else {
            info!(
                text_len = text.len(),
                text_preview = %text_preview(&text),
                "selection captured"
            );
        }
        text
    }
}
