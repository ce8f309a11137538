//! End-to-end tests for the select-and-speak pipeline
//!
//! The OS collaborators (clipboard, key injection, speech process, hotkey
//! registration) are replaced with in-memory fakes sharing one `Desk`, so the
//! whole hotkey → capture → speech path runs without permissions or audio.
//!
//! The real-device variant is ignored; run with:
//! cargo test --test pipeline_test -- --ignored

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use read4me::capture::{CaptureTiming, SelectionCapture};
use read4me::clipboard::{Clipboard, ClipboardError};
use read4me::input::hotkey::{
    HotkeyError, HotkeyGate, HotkeyRegistrar, Trigger, TriggerHandler, TriggerSource,
};
use read4me::input::keystroke::{InjectError, KeyInjector};
use read4me::pipeline::{SpeakOutcome, SpeakSelection};
use read4me::speech::{
    SpeechBackend, SpeechError, SpeechParams, SpeechProcess, SpeechRequest, SpeechSession,
};

/// Shared state of the fake desktop
#[derive(Default)]
struct Desk {
    clipboard: String,
    selection: String,
    modifier_down: bool,
    copies: usize,
    spoken: Vec<String>,
    alive: Vec<bool>,
    max_live: usize,
}

impl Desk {
    fn live(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }
}

type SharedDesk = Arc<Mutex<Desk>>;

struct FakeClipboard(SharedDesk);

impl Clipboard for FakeClipboard {
    fn read(&mut self) -> Result<String, ClipboardError> {
        Ok(self.0.lock().unwrap().clipboard.clone())
    }

    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.0.lock().unwrap().clipboard = text.to_owned();
        Ok(())
    }
}

/// Foreground app: ⌘C copies the selection
struct FakeKeyboard(SharedDesk);

impl KeyInjector for FakeKeyboard {
    fn press_modifier(&self) -> Result<(), InjectError> {
        self.0.lock().unwrap().modifier_down = true;
        Ok(())
    }

    fn release_modifier(&self) -> Result<(), InjectError> {
        self.0.lock().unwrap().modifier_down = false;
        Ok(())
    }

    fn tap_key(&self, key: char) -> Result<(), InjectError> {
        let mut desk = self.0.lock().unwrap();
        if desk.modifier_down && key == 'c' {
            desk.copies += 1;
            desk.clipboard = desk.selection.clone();
        }
        Ok(())
    }
}

struct FakeVoice {
    idx: usize,
    desk: SharedDesk,
}

impl SpeechProcess for FakeVoice {
    fn has_exited(&mut self) -> bool {
        !self.desk.lock().unwrap().alive[self.idx]
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.desk.lock().unwrap().alive[self.idx] = false;
        Ok(())
    }
}

struct FakeSynth(SharedDesk);

impl SpeechBackend for FakeSynth {
    fn spawn(&self, request: &SpeechRequest) -> Result<Box<dyn SpeechProcess>, SpeechError> {
        let mut desk = self.0.lock().unwrap();
        desk.spoken.push(request.text().to_owned());
        desk.alive.push(true);
        desk.max_live = desk.max_live.max(desk.live());
        Ok(Box::new(FakeVoice {
            idx: desk.alive.len() - 1,
            desk: Arc::clone(&self.0),
        }))
    }
}

fn desk(clipboard: &str, selection: &str) -> SharedDesk {
    Arc::new(Mutex::new(Desk {
        clipboard: clipboard.to_owned(),
        selection: selection.to_owned(),
        ..Desk::default()
    }))
}

fn pipeline(desk: &SharedDesk) -> SpeakSelection {
    let capture = SelectionCapture::new(
        Box::new(FakeClipboard(Arc::clone(desk))),
        Box::new(FakeKeyboard(Arc::clone(desk))),
        CaptureTiming::immediate(),
    );
    let speech = SpeechSession::new(Box::new(FakeSynth(Arc::clone(desk))));
    SpeakSelection::new(capture, speech, SpeechParams::default())
}

#[test]
fn test_speaks_selection_and_restores_clipboard() {
    let desk = desk("hello", "world");
    let pipeline = pipeline(&desk);

    assert_eq!(pipeline.speak_selection(), SpeakOutcome::Speaking);

    let desk = desk.lock().unwrap();
    assert_eq!(desk.spoken, vec!["world"]);
    assert_eq!(desk.clipboard, "hello");
    assert!(!desk.modifier_down);
}

#[test]
fn test_no_selection_spawns_nothing() {
    let desk = desk("hello", "");
    let pipeline = pipeline(&desk);

    assert_eq!(pipeline.speak_selection(), SpeakOutcome::NothingSelected);

    let desk = desk.lock().unwrap();
    assert!(desk.spoken.is_empty());
    assert_eq!(desk.clipboard, "hello");
}

#[test]
fn test_whitespace_selection_spawns_nothing() {
    let desk = desk("hello", " \n\t ");
    let pipeline = pipeline(&desk);

    assert_eq!(pipeline.speak_selection(), SpeakOutcome::NothingSelected);
    assert!(desk.lock().unwrap().spoken.is_empty());
}

#[test]
fn test_empty_selection_keeps_current_speech() {
    let desk = desk("", "first");
    let pipeline = pipeline(&desk);
    pipeline.speak_selection();

    desk.lock().unwrap().selection = String::new();
    assert_eq!(pipeline.speak_selection(), SpeakOutcome::NothingSelected);

    assert!(pipeline.speech().is_speaking());
    assert_eq!(desk.lock().unwrap().live(), 1);
}

#[test]
fn test_second_selection_replaces_first() {
    let desk = desk("clip", "A");
    let pipeline = pipeline(&desk);
    pipeline.speak_selection();

    desk.lock().unwrap().selection = "B".to_owned();
    pipeline.speak_selection();

    let desk = desk.lock().unwrap();
    assert_eq!(desk.spoken, vec!["A", "B"]);
    assert_eq!(desk.alive, vec![false, true]);
    assert_eq!(desk.max_live, 1);
    assert_eq!(desk.clipboard, "clip");
}

#[test]
fn test_stop_skips_capture() {
    let desk = desk("hello", "world");
    let pipeline = pipeline(&desk);
    pipeline.speak_selection();

    assert!(pipeline.stop_speaking());
    assert!(!pipeline.stop_speaking());

    let desk = desk.lock().unwrap();
    assert_eq!(desk.copies, 1);
    assert_eq!(desk.live(), 0);
}

// Hotkey plumbing

#[derive(Default)]
struct Registry {
    sender: Option<mpsc::Sender<Trigger>>,
}

struct ChannelSource(mpsc::Receiver<Trigger>);

impl TriggerSource for ChannelSource {
    fn next_trigger(&mut self, timeout: Duration) -> Option<Trigger> {
        self.0.recv_timeout(timeout).ok()
    }
}

struct ChannelRegistrar(Arc<Mutex<Registry>>);

impl HotkeyRegistrar for ChannelRegistrar {
    fn register(&mut self) -> Result<Box<dyn TriggerSource>, HotkeyError> {
        let (tx, rx) = mpsc::channel();
        self.0.lock().unwrap().sender = Some(tx);
        Ok(Box::new(ChannelSource(rx)))
    }

    fn unregister(&mut self) {
        self.0.lock().unwrap().sender = None;
    }
}

/// Runs the real pipeline and reports when each trigger is done
struct Observed {
    pipeline: SpeakSelection,
    done: Mutex<mpsc::Sender<Trigger>>,
}

impl TriggerHandler for Observed {
    fn on_speak(&self) {
        self.pipeline.on_speak();
        let _ = self.done.lock().unwrap().send(Trigger::Speak);
    }

    fn on_stop(&self) {
        self.pipeline.on_stop();
        let _ = self.done.lock().unwrap().send(Trigger::Stop);
    }
}

fn press(registry: &Arc<Mutex<Registry>>, trigger: Trigger) {
    registry
        .lock()
        .unwrap()
        .sender
        .as_ref()
        .unwrap()
        .send(trigger)
        .unwrap();
}

#[test]
fn test_hotkeys_drive_pipeline() {
    let desk = desk("hello", "world");
    let registry = Arc::new(Mutex::new(Registry::default()));
    let (done_tx, done_rx) = mpsc::channel();
    let handler = Arc::new(Observed {
        pipeline: pipeline(&desk),
        done: Mutex::new(done_tx),
    });

    let mut gate = HotkeyGate::new(
        Box::new(ChannelRegistrar(Arc::clone(&registry))),
        handler,
        Duration::from_secs(60),
    );
    gate.start().unwrap();

    press(&registry, Trigger::Speak);
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap(), Trigger::Speak);
    {
        let desk = desk.lock().unwrap();
        assert_eq!(desk.spoken, vec!["world"]);
        assert_eq!(desk.clipboard, "hello");
        assert_eq!(desk.live(), 1);
    }

    // A repeat inside the debounce window never reaches the pipeline
    press(&registry, Trigger::Speak);
    press(&registry, Trigger::Stop);
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(2)).unwrap(), Trigger::Stop);

    let desk_state = desk.lock().unwrap();
    assert_eq!(desk_state.copies, 1);
    assert_eq!(desk_state.live(), 0);
    drop(desk_state);

    gate.stop();
    assert!(registry.lock().unwrap().sender.is_none());
}

#[test]
fn test_shutdown_stops_speech_and_releases_hotkeys() {
    let desk = desk("hello", "world");
    let registry = Arc::new(Mutex::new(Registry::default()));
    let pipeline = Arc::new(pipeline(&desk));

    let mut gate = HotkeyGate::new(
        Box::new(ChannelRegistrar(Arc::clone(&registry))),
        Arc::clone(&pipeline) as Arc<dyn TriggerHandler>,
        Duration::ZERO,
    );
    gate.start().unwrap();
    assert_eq!(pipeline.speak_selection(), SpeakOutcome::Speaking);

    pipeline.shutdown(&mut gate);

    assert!(!gate.is_enabled());
    assert!(!pipeline.speech().is_speaking());
    assert!(registry.lock().unwrap().sender.is_none());
    assert_eq!(desk.lock().unwrap().live(), 0);

    // A second interrupt after shutdown is harmless
    pipeline.shutdown(&mut gate);
    assert!(!gate.is_enabled());
}

#[test]
#[ignore = "requires macOS Accessibility permission, a text selection and `say`"]
fn test_real_selection_is_spoken() {
    // 1. Select some text in any app
    // 2. Run: cargo test --test pipeline_test test_real_selection_is_spoken -- --ignored
    let pipeline = SpeakSelection::from_config(&read4me::config::Config::default());
    let outcome = pipeline.speak_selection();
    assert_ne!(outcome, SpeakOutcome::Failed);
    std::thread::sleep(Duration::from_secs(1));
    pipeline.stop_speaking();
}
