use thiserror::Error;
use tracing::{debug, warn};

/// Key injection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    /// Failed to create `CGEvent` source
    #[error("failed to create CGEvent source")]
    EventSource,

    /// Failed to create keyboard `CGEvent`
    #[error("failed to create keyboard CGEvent")]
    EventCreation,

    /// No virtual keycode for this character
    #[error("no keycode for {0:?}")]
    UnsupportedKey(char),

    /// Key injection is not available on this platform
    #[error("synthetic key events are not supported on this platform")]
    Unsupported,
}

/// Synthetic keyboard input
///
/// The modifier is the platform's command key (⌘ on macOS).
#[cfg_attr(test, mockall::automock)]
pub trait KeyInjector: Send + Sync {
    /// Press and hold the command modifier
    ///
    /// # Errors
    /// Returns error if the key event cannot be created
    fn press_modifier(&self) -> Result<(), InjectError>;

    /// Release the command modifier
    ///
    /// # Errors
    /// Returns error if the key event cannot be created
    fn release_modifier(&self) -> Result<(), InjectError>;

    /// Press and release a single key
    ///
    /// # Errors
    /// Returns error if the key has no keycode or the event cannot be created
    fn tap_key(&self, key: char) -> Result<(), InjectError>;
}

/// Holds the command modifier down until dropped
///
/// Release happens on every exit path, including a failed key tap in between.
#[must_use = "the modifier is released as soon as the guard is dropped"]
pub struct ModifierGuard<'a> {
    keys: &'a dyn KeyInjector,
}

impl<'a> ModifierGuard<'a> {
    /// Press the modifier
    ///
    /// # Errors
    /// Returns error if the press fails; nothing is held in that case
    pub fn press(keys: &'a dyn KeyInjector) -> Result<Self, InjectError> {
        keys.press_modifier()?;
        Ok(Self { keys })
    }
}

impl Drop for ModifierGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.keys.release_modifier() {
            warn!(error = %e, "failed to release command modifier");
        }
    }
}

/// Send the platform "copy" chord (⌘C)
///
/// # Errors
/// Returns the first injection error; the modifier is released regardless
pub fn send_copy(keys: &dyn KeyInjector) -> Result<(), InjectError> {
    let _held = ModifierGuard::press(keys)?;
    keys.tap_key('c')?;
    debug!("copy chord sent");
    Ok(())
}

/// macOS ANSI virtual keycode for a letter (Carbon `kVK_ANSI_*`)
#[must_use]
pub const fn ansi_keycode(key: char) -> Option<u16> {
    let code = match key.to_ascii_lowercase() {
        'a' => 0x00,
        's' => 0x01,
        'd' => 0x02,
        'f' => 0x03,
        'h' => 0x04,
        'g' => 0x05,
        'z' => 0x06,
        'x' => 0x07,
        'c' => 0x08,
        'v' => 0x09,
        'b' => 0x0B,
        'q' => 0x0C,
        'w' => 0x0D,
        'e' => 0x0E,
        'r' => 0x0F,
        'y' => 0x10,
        't' => 0x11,
        'o' => 0x1F,
        'u' => 0x20,
        'i' => 0x22,
        'p' => 0x23,
        'l' => 0x25,
        'j' => 0x26,
        'k' => 0x28,
        'n' => 0x2D,
        'm' => 0x2E,
        _ => return None,
    };
    Some(code)
}

/// Key injector for the current platform
#[must_use]
pub fn platform_injector() -> Box<dyn KeyInjector> {
    #[cfg(target_os = "macos")]
    {
        Box::new(CgEventInjector::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(UnsupportedInjector)
    }
}

#[cfg(target_os = "macos")]
pub use macos::CgEventInjector;

#[cfg(target_os = "macos")]
mod macos {
    use super::{ansi_keycode, InjectError, KeyInjector};
    use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
    use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::error;

    const KEYCODE_COMMAND: CGKeyCode = 0x37;

    /// Posts keyboard `CGEvent`s to the HID system
    ///
    /// Requires Accessibility permission (verified at app startup). `post()`
    /// does not report failures, so a revoked permission shows up as an
    /// empty capture rather than an error here.
    #[derive(Debug, Default)]
    pub struct CgEventInjector {
        command_held: AtomicBool,
    }

    impl CgEventInjector {
        /// Create a new injector
        #[must_use]
        pub const fn new() -> Self {
            Self {
                command_held: AtomicBool::new(false),
            }
        }

        fn post(
            keycode: CGKeyCode,
            key_down: bool,
            flags: CGEventFlags,
        ) -> Result<(), InjectError> {
            // CGEventSource is not Send, so one is created per event
            let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
                error!("CGEventSource creation failed - Accessibility permission may be missing");
                InjectError::EventSource
            })?;
            let event = CGEvent::new_keyboard_event(source, keycode, key_down)
                .map_err(|()| InjectError::EventCreation)?;
            // Always set flags explicitly so a stuck Caps Lock does not leak in
            event.set_flags(flags);
            event.post(CGEventTapLocation::HID);
            Ok(())
        }

        fn current_flags(&self) -> CGEventFlags {
            if self.command_held.load(Ordering::SeqCst) {
                CGEventFlags::CGEventFlagCommand
            } else {
                CGEventFlags::empty()
            }
        }
    }

    impl KeyInjector for CgEventInjector {
        fn press_modifier(&self) -> Result<(), InjectError> {
            Self::post(KEYCODE_COMMAND, true, CGEventFlags::CGEventFlagCommand)?;
            self.command_held.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn release_modifier(&self) -> Result<(), InjectError> {
            self.command_held.store(false, Ordering::SeqCst);
            Self::post(KEYCODE_COMMAND, false, CGEventFlags::empty())
        }

        fn tap_key(&self, key: char) -> Result<(), InjectError> {
            let keycode = ansi_keycode(key).ok_or(InjectError::UnsupportedKey(key))?;
            let flags = self.current_flags();
            Self::post(keycode, true, flags)?;
            Self::post(keycode, false, flags)
        }
    }
}

/// Fallback for platforms without a key injection backend
#[cfg(not(target_os = "macos"))]
#[derive(Debug, Default)]
pub struct UnsupportedInjector;

#[cfg(not(target_os = "macos"))]
impl KeyInjector for UnsupportedInjector {
    fn press_modifier(&self) -> Result<(), InjectError> {
        Err(InjectError::Unsupported)
    }

    fn release_modifier(&self) -> Result<(), InjectError> {
        Err(InjectError::Unsupported)
    }

    fn tap_key(&self, _key: char) -> Result<(), InjectError> {
        Err(InjectError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_send_copy_order() {
        let mut keys = MockKeyInjector::new();
        let mut seq = Sequence::new();
        keys.expect_press_modifier()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        keys.expect_tap_key()
            .withf(|k| *k == 'c')
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        keys.expect_release_modifier()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        assert!(send_copy(&keys).is_ok());
    }

    #[test]
    fn test_modifier_released_when_tap_fails() {
        let mut keys = MockKeyInjector::new();
        keys.expect_press_modifier().times(1).returning(|| Ok(()));
        keys.expect_tap_key()
            .times(1)
            .returning(|_| Err(InjectError::EventCreation));
        keys.expect_release_modifier().times(1).returning(|| Ok(()));

        assert_eq!(send_copy(&keys), Err(InjectError::EventCreation));
    }

    #[test]
    fn test_no_release_when_press_fails() {
        let mut keys = MockKeyInjector::new();
        keys.expect_press_modifier()
            .times(1)
            .returning(|| Err(InjectError::EventSource));
        keys.expect_tap_key().never();
        keys.expect_release_modifier().never();

        assert_eq!(send_copy(&keys), Err(InjectError::EventSource));
    }

    #[test]
    fn test_release_failure_does_not_mask_success() {
        let mut keys = MockKeyInjector::new();
        keys.expect_press_modifier().returning(|| Ok(()));
        keys.expect_tap_key().returning(|_| Ok(()));
        keys.expect_release_modifier()
            .times(1)
            .returning(|| Err(InjectError::EventCreation));

        assert!(send_copy(&keys).is_ok());
    }

    #[test]
    fn test_ansi_keycode() {
        assert_eq!(ansi_keycode('c'), Some(0x08));
        assert_eq!(ansi_keycode('C'), Some(0x08));
        assert_eq!(ansi_keycode('a'), Some(0x00));
        assert_eq!(ansi_keycode('m'), Some(0x2E));
        assert_eq!(ansi_keycode('1'), None);
        assert_eq!(ansi_keycode('é'), None);
    }

    #[test]
    #[ignore = "requires Accessibility permissions; sends a real ⌘C"]
    fn test_platform_copy() {
        assert!(send_copy(platform_injector().as_ref()).is_ok());
    }
}
