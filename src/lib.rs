//! read4me - select text anywhere, press a hotkey, hear it spoken
//!
//! This library exports core modules for testing and the binary.

/// Selection capture through the clipboard
pub mod capture;
/// System clipboard access
pub mod clipboard;
/// Configuration management
pub mod config;
/// Input handling (hotkeys, debouncing, synthetic keystrokes)
pub mod input;
/// macOS permission checks
pub mod permissions;
/// Select-and-speak pipeline
pub mod pipeline;
/// Speech process lifecycle
pub mod speech;
/// Logging
pub mod telemetry;
/// Menu bar shell
#[cfg(target_os = "macos")]
pub mod tray;
