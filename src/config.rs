use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureTiming;
use crate::speech::SpeechParams;

/// Top-level configuration, loaded from `~/.read4me.toml`
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Hotkey chords
    pub hotkey: HotkeyConfig,
    /// Speech synthesis
    pub speech: SpeechConfig,
    /// Selection capture timing
    pub capture: CaptureConfig,
    /// Logging
    pub telemetry: TelemetryConfig,
    /// Menu bar shell
    pub ui: UiConfig,
}

/// Hotkey chords, written as `Modifier+Modifier+Key`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Chord that copies the selection and speaks it
    pub speak: String,
    /// Chord that interrupts speech
    pub stop: String,
    /// Start listening as soon as the app launches
    pub enabled_on_launch: bool,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            speak: "Command+Shift+S".to_owned(),
            stop: "Command+Shift+X".to_owned(),
            enabled_on_launch: true,
        }
    }
}

/// Speech command settings
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speech program, fed text on stdin
    pub command: String,
    /// Speaking rate in words per minute
    pub rate_wpm: u32,
    /// Voice name (None = system default)
    pub voice: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: "say".to_owned(),
            rate_wpm: 190,
            voice: None,
        }
    }
}

impl SpeechConfig {
    /// Synthesis parameters for each request
    #[must_use]
    pub fn params(&self) -> SpeechParams {
        SpeechParams {
            rate_wpm: self.rate_wpm,
            voice: self.voice.clone().filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Delays around the synthetic copy keystroke
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wait for the hotkey's own modifiers to release before copying
    pub settle_delay_ms: u64,
    /// Wait for the foreground app to fill the clipboard
    pub capture_delay_ms: u64,
    /// Extra wait before the single re-read of an empty clipboard
    pub retry_delay_ms: u64,
    /// Minimum interval between accepted speak triggers
    pub debounce_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 50,
            capture_delay_ms: 300,
            retry_delay_ms: 200,
            debounce_ms: 500,
        }
    }
}

impl CaptureConfig {
    /// Capture delays as durations
    #[must_use]
    pub const fn timing(&self) -> CaptureTiming {
        CaptureTiming {
            settle: Duration::from_millis(self.settle_delay_ms),
            capture: Duration::from_millis(self.capture_delay_ms),
            retry: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Debounce window as a duration
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Logging destination
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log to file (true) or stdout (false)
    pub enabled: bool,
    /// Log file path, `~/` is expanded
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.read4me/read4me.log".to_owned(),
        }
    }
}

/// Menu bar settings
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    /// Show the menu bar icon (macOS); otherwise run headless until Ctrl+C
    pub menu_bar: bool,
    /// Opened by the "How to use…" menu item
    pub docs_url: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            menu_bar: true,
            docs_url: "https://github.com/fotiecodes/read4me#readme".to_owned(),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# read4me configuration

[hotkey]
# Copy the current selection and read it aloud
speak = "Command+Shift+S"
# Stop reading
stop = "Command+Shift+X"
enabled_on_launch = true

[speech]
command = "say"
rate_wpm = 190
# voice = "Samantha"

[capture]
settle_delay_ms = 50
capture_delay_ms = 300
retry_delay_ms = 200
debounce_ms = 500

[telemetry]
enabled = true
log_path = "~/.read4me/read4me.log"

[ui]
menu_bar = true
docs_url = "https://github.com/fotiecodes/read4me#readme"
"#;

impl Config {
    /// Load config from ~/.read4me.toml, writing the default file on first run
    ///
    /// # Errors
    /// Returns error if HOME is unset or the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::parse(&contents)
    }

    /// Parse config from TOML text
    ///
    /// # Errors
    /// Returns error on invalid TOML or mistyped fields
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    /// Path of the config file
    ///
    /// # Errors
    /// Returns error if HOME is unset
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".read4me.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
