use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyEventReceiver, GlobalHotKeyManager, HotKeyState,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::HotkeyConfig;
use crate::input::debounce::Debouncer;

/// How often the listener thread checks whether it should exit
const LISTENER_POLL: Duration = Duration::from_millis(100);

/// Hotkey errors
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// Modifier name not recognised
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),

    /// Key name not recognised
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    /// Chord does not end in a key
    #[error("chord has no key: {0}")]
    MissingKey(String),

    /// Speak and stop share a chord
    #[error("speak and stop hotkeys are the same chord: {0}")]
    DuplicateChord(String),

    /// OS hotkey manager unavailable
    #[error("failed to create hotkey manager: {0}")]
    Manager(String),

    /// OS refused the chord (often already taken by another app)
    #[error("failed to register hotkey {chord}: {reason}")]
    Register {
        /// Chord as configured
        chord: String,
        /// OS error
        reason: String,
    },

    /// Listener thread could not be spawned
    #[error("failed to start hotkey listener thread")]
    Thread(#[source] io::Error),
}

/// Logical hotkey actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Copy the selection and speak it
    Speak,
    /// Interrupt speech
    Stop,
}

/// Receives triggers on the listener thread
#[cfg_attr(test, mockall::automock)]
pub trait TriggerHandler: Send + Sync {
    /// Speak trigger, already debounced
    fn on_speak(&self);

    /// Stop trigger, never debounced
    fn on_stop(&self);
}

/// Stream of triggers, read by the listener thread
pub trait TriggerSource: Send {
    /// Wait up to `timeout` for the next trigger
    fn next_trigger(&mut self, timeout: Duration) -> Option<Trigger>;

    /// Drop presses queued before the listener started
    fn discard_pending(&mut self) {
        while self.next_trigger(Duration::ZERO).is_some() {}
    }
}

/// Registers the two chords with the OS
pub trait HotkeyRegistrar {
    /// Register both chords and return the stream their presses arrive on
    ///
    /// # Errors
    /// Returns error if either chord cannot be registered; nothing stays registered
    fn register(&mut self) -> Result<Box<dyn TriggerSource>, HotkeyError>;

    /// Unregister both chords; failures are logged
    fn unregister(&mut self);
}

/// Parse a chord such as `Command+Shift+S`
///
/// # Errors
/// Returns error on unknown modifiers or keys, or if the chord has no key
pub fn parse_chord(chord: &str) -> Result<HotKey, HotkeyError> {
    let tokens: Vec<&str> = chord.split('+').map(str::trim).collect();
    let Some((key_token, modifier_tokens)) = tokens.split_last() else {
        return Err(HotkeyError::MissingKey(chord.to_owned()));
    };

    let mut modifiers = Modifiers::empty();
    for token in modifier_tokens {
        modifiers |= parse_modifier(token)
            .ok_or_else(|| HotkeyError::UnknownModifier((*token).to_owned()))?;
    }

    if key_token.is_empty() || parse_modifier(key_token).is_some() {
        return Err(HotkeyError::MissingKey(chord.to_owned()));
    }
    let key = parse_key(key_token)?;

    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, key))
}

fn parse_modifier(token: &str) -> Option<Modifiers> {
    match token.to_ascii_lowercase().as_str() {
        "command" | "cmd" | "super" | "meta" => Some(Modifiers::SUPER),
        "shift" => Some(Modifiers::SHIFT),
        "control" | "ctrl" => Some(Modifiers::CONTROL),
        "option" | "alt" => Some(Modifiers::ALT),
        _ => None,
    }
}

fn parse_key(token: &str) -> Result<Code, HotkeyError> {
    let code = match token.to_ascii_uppercase().as_str() {
        "A" => Code::KeyA,
        "B" => Code::KeyB,
        "C" => Code::KeyC,
        "D" => Code::KeyD,
        "E" => Code::KeyE,
        "F" => Code::KeyF,
        "G" => Code::KeyG,
        "H" => Code::KeyH,
        "I" => Code::KeyI,
        "J" => Code::KeyJ,
        "K" => Code::KeyK,
        "L" => Code::KeyL,
        "M" => Code::KeyM,
        "N" => Code::KeyN,
        "O" => Code::KeyO,
        "P" => Code::KeyP,
        "Q" => Code::KeyQ,
        "R" => Code::KeyR,
        "S" => Code::KeyS,
        "T" => Code::KeyT,
        "U" => Code::KeyU,
        "V" => Code::KeyV,
        "W" => Code::KeyW,
        "X" => Code::KeyX,
        "Y" => Code::KeyY,
        "Z" => Code::KeyZ,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "SPACE" => Code::Space,
        _ => return Err(HotkeyError::UnsupportedKey(token.to_owned())),
    };
    Ok(code)
}

/// Parse both chords from config and reject identical ones
///
/// # Errors
/// Returns error if either chord is invalid or both are the same
pub fn parse_chords(config: &HotkeyConfig) -> Result<(HotKey, HotKey), HotkeyError> {
    let speak = parse_chord(&config.speak)?;
    let stop = parse_chord(&config.stop)?;
    if speak.id() == stop.id() {
        return Err(HotkeyError::DuplicateChord(config.speak.clone()));
    }
    Ok((speak, stop))
}

/// Map a raw hotkey event to a trigger; only presses of our chords count
#[must_use]
pub fn trigger_for(
    event_id: u32,
    state: HotKeyState,
    speak_id: u32,
    stop_id: u32,
) -> Option<Trigger> {
    if !matches!(state, HotKeyState::Pressed) {
        return None;
    }
    if event_id == speak_id {
        Some(Trigger::Speak)
    } else if event_id == stop_id {
        Some(Trigger::Stop)
    } else {
        None
    }
}

/// Chords registered through `global-hotkey`
///
/// Must be created on the main thread after the event loop is built; macOS
/// only delivers presses while that loop runs. Events are read from the
/// global receiver on the listener thread.
pub struct GlobalHotkeyRegistrar {
    manager: GlobalHotKeyManager,
    speak: HotKey,
    stop: HotKey,
    speak_label: String,
    stop_label: String,
}

impl GlobalHotkeyRegistrar {
    /// Parse chords from config and create the OS hotkey manager
    ///
    /// # Errors
    /// Returns error on invalid chords or if the manager cannot be created
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let (speak, stop) = parse_chords(config)?;
        let manager =
            GlobalHotKeyManager::new().map_err(|e| HotkeyError::Manager(e.to_string()))?;

        Ok(Self {
            manager,
            speak,
            stop,
            speak_label: config.speak.clone(),
            stop_label: config.stop.clone(),
        })
    }
}

impl HotkeyRegistrar for GlobalHotkeyRegistrar {
    fn register(&mut self) -> Result<Box<dyn TriggerSource>, HotkeyError> {
        self.manager
            .register(self.speak)
            .map_err(|e| HotkeyError::Register {
                chord: self.speak_label.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self.manager.register(self.stop) {
            if let Err(undo) = self.manager.unregister(self.speak) {
                error!("failed to unregister speak hotkey: {}", undo);
            }
            return Err(HotkeyError::Register {
                chord: self.stop_label.clone(),
                reason: e.to_string(),
            });
        }

        info!(speak = %self.speak_label, stop = %self.stop_label, "registered hotkeys");

        Ok(Box::new(GlobalHotkeyTriggers {
            receiver: GlobalHotKeyEvent::receiver(),
            speak_id: self.speak.id(),
            stop_id: self.stop.id(),
        }))
    }

    fn unregister(&mut self) {
        for hotkey in [self.speak, self.stop] {
            if let Err(e) = self.manager.unregister(hotkey) {
                error!("failed to unregister hotkey: {}", e);
            }
        }
        debug!("unregistered hotkeys");
    }
}

struct GlobalHotkeyTriggers {
    receiver: &'static GlobalHotKeyEventReceiver,
    speak_id: u32,
    stop_id: u32,
}

impl TriggerSource for GlobalHotkeyTriggers {
    fn next_trigger(&mut self, timeout: Duration) -> Option<Trigger> {
        let event = self.receiver.recv_timeout(timeout).ok()?;
        trigger_for(event.id, event.state, self.speak_id, self.stop_id)
    }

    fn discard_pending(&mut self) {
        // The receiver is process-wide and also holds releases and presses
        // from while the gate was disabled
        let mut dropped = 0_usize;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded stale hotkey events");
        }
    }
}

/// Routes triggers to the handler, debouncing speak
pub struct Dispatcher {
    debouncer: Debouncer,
    handler: Arc<dyn TriggerHandler>,
}

impl Dispatcher {
    /// Create a dispatcher with the given debounce window for speak
    #[must_use]
    pub fn new(handler: Arc<dyn TriggerHandler>, debounce: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(debounce),
            handler,
        }
    }

    /// Deliver `trigger`; returns `false` if it was debounced
    pub fn dispatch(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Speak => {
                if !self.debouncer.accept() {
                    debug!("speak hotkey debounced");
                    return false;
                }
                info!("speak hotkey pressed");
                self.handler.on_speak();
            }
            Trigger::Stop => {
                info!("stop hotkey pressed");
                self.handler.on_stop();
            }
        }
        true
    }
}

/// Background thread reading triggers and dispatching them
struct ListenerThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ListenerThread {
    fn spawn(
        mut source: Box<dyn TriggerSource>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, HotkeyError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("read4me-hotkeys".to_owned())
            .spawn(move || {
                debug!("hotkey listener thread started");
                while thread_running.load(Ordering::SeqCst) {
                    if let Some(trigger) = source.next_trigger(LISTENER_POLL) {
                        // Gate may have been disabled while we were waiting
                        if !thread_running.load(Ordering::SeqCst) {
                            break;
                        }
                        dispatcher.dispatch(trigger);
                    }
                }
                debug!("hotkey listener thread exiting");
            })
            .map_err(HotkeyError::Thread)?;

        Ok(Self { running, handle })
    }

    fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if self.handle.join().is_err() {
            error!("hotkey listener thread panicked");
        }
    }
}

/// Whether hotkeys are being listened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    /// No listener; hotkeys are ignored
    Disabled,
    /// Listener thread running
    Enabled,
}

/// Enable/disable switch around the hotkey listener
///
/// A listener thread exists exactly when the gate is enabled.
/// `start` and `stop` are idempotent.
pub struct HotkeyGate {
    registrar: Box<dyn HotkeyRegistrar>,
    dispatcher: Arc<Dispatcher>,
    listener: Option<ListenerThread>,
}

impl HotkeyGate {
    /// Create a disabled gate
    #[must_use]
    pub fn new(
        registrar: Box<dyn HotkeyRegistrar>,
        handler: Arc<dyn TriggerHandler>,
        debounce: Duration,
    ) -> Self {
        Self {
            registrar,
            dispatcher: Arc::new(Dispatcher::new(handler, debounce)),
            listener: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> GateState {
        if self.listener.is_some() {
            GateState::Enabled
        } else {
            GateState::Disabled
        }
    }

    /// Whether hotkeys are live
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.listener.is_some()
    }

    /// Disabled → Enabled; no-op when already enabled
    ///
    /// # Errors
    /// Returns error if the chords cannot be registered or the thread cannot
    /// start; the gate stays disabled
    pub fn start(&mut self) -> Result<(), HotkeyError> {
        if self.listener.is_some() {
            debug!("hotkeys already enabled");
            return Ok(());
        }

        let mut source = self.registrar.register()?;
        source.discard_pending();
        match ListenerThread::spawn(source, Arc::clone(&self.dispatcher)) {
            Ok(listener) => self.listener = Some(listener),
            Err(e) => {
                self.registrar.unregister();
                return Err(e);
            }
        }

        info!("gate: Disabled → Enabled");
        Ok(())
    }

    /// Enabled → Disabled; no-op when already disabled
    ///
    /// Waits for an in-flight capture on the listener thread to finish.
    pub fn stop(&mut self) {
        let Some(listener) = self.listener.take() else {
            debug!("hotkeys already disabled");
            return;
        };

        listener.stop();
        self.registrar.unregister();
        info!("gate: Enabled → Disabled");
    }

    /// Start or stop to match `enabled`
    ///
    /// # Errors
    /// Returns error if enabling fails
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), HotkeyError> {
        if enabled {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }
}

impl Drop for HotkeyGate {
    fn drop(&mut self) {
        self.stop();
    }
}
