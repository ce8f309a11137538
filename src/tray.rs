use anyhow::{bail, Context, Result};
use tray_icon::menu::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

use crate::input::hotkey::HotkeyGate;

const ID_ENABLED: &str = "read4me.enabled";
const ID_DOCS: &str = "read4me.docs";
const ID_QUIT: &str = "read4me.quit";

const ICON_SIZE: u32 = 22;

/// Menu actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    /// Flip the hotkey gate
    ToggleEnabled,
    /// Open the usage docs in the browser
    OpenDocs,
    /// Stop speech and exit
    Quit,
}

impl TrayCommand {
    /// Map a menu item id to a command
    #[must_use]
    pub fn from_menu_id(id: &str) -> Option<Self> {
        match id {
            ID_ENABLED => Some(Self::ToggleEnabled),
            ID_DOCS => Some(Self::OpenDocs),
            ID_QUIT => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Menu bar icon with the enable toggle
pub struct TrayManager {
    tray: TrayIcon,
    docs_url: String,
}

impl TrayManager {
    /// Show the menu bar icon
    ///
    /// # Errors
    /// Returns error if the icon or menu cannot be built
    pub fn new(enabled: bool, docs_url: &str) -> Result<Self> {
        Ok(Self {
            tray: Self::build_tray(enabled)?,
            docs_url: docs_url.to_owned(),
        })
    }

    fn build_tray(enabled: bool) -> Result<TrayIcon> {
        let menu = Self::build_menu(enabled)?;
        let icon = Icon::from_rgba(icon_rgba(enabled), ICON_SIZE, ICON_SIZE)
            .context("failed to create icon from RGBA data")?;

        TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(status_text(enabled))
            .with_icon(icon)
            .build()
            .context("failed to build tray icon")
    }

    fn build_menu(enabled: bool) -> Result<Menu> {
        let menu = Menu::new();

        let status = MenuItem::new(status_text(enabled), false, None);
        menu.append(&status).context("failed to append status item")?;
        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        let toggle = CheckMenuItem::with_id(ID_ENABLED, "Enabled", true, enabled, None);
        menu.append(&toggle).context("failed to append enabled item")?;

        let docs = MenuItem::with_id(ID_DOCS, "How to use…", true, None);
        menu.append(&docs).context("failed to append docs item")?;

        menu.append(&PredefinedMenuItem::separator())
            .context("failed to append separator")?;

        // Custom quit item so speech is stopped before the process exits
        let quit = MenuItem::with_id(ID_QUIT, "Quit read4me", true, None);
        menu.append(&quit).context("failed to append quit item")?;

        Ok(menu)
    }

    fn rebuild(&mut self, enabled: bool) -> Result<()> {
        // Rebuild entire tray (set_icon() does not refresh reliably on macOS)
        self.tray = Self::build_tray(enabled)?;
        tracing::info!("tray icon rebuilt, enabled: {}", enabled);
        Ok(())
    }

    /// Next pending menu command, if any
    #[must_use]
    pub fn poll_events() -> Option<TrayCommand> {
        let event = MenuEvent::receiver().try_recv().ok()?;
        let id = event.id.0.as_str();
        tracing::debug!("tray menu event received: id={:?}", id);
        TrayCommand::from_menu_id(id)
    }

    /// Apply pending menu commands to the gate; returns `true` when quit was chosen
    pub fn handle_events(&mut self, gate: &mut HotkeyGate) -> bool {
        while let Some(command) = Self::poll_events() {
            match command {
                TrayCommand::ToggleEnabled => self.toggle(gate),
                TrayCommand::OpenDocs => {
                    if let Err(e) = open_url(&self.docs_url) {
                        tracing::warn!(error = %e, "failed to open docs");
                    }
                }
                TrayCommand::Quit => return true,
            }
        }
        false
    }

    fn toggle(&mut self, gate: &mut HotkeyGate) {
        let wanted = !gate.is_enabled();
        if let Err(e) = gate.set_enabled(wanted) {
            tracing::error!(error = %e, "failed to enable hotkeys");
        }
        // The check item flips itself on click, so rebuild even if enabling failed
        if let Err(e) = self.rebuild(gate.is_enabled()) {
            tracing::error!(error = %e, "failed to update tray");
        }
    }
}

/// Status line and tooltip
#[must_use]
pub const fn status_text(enabled: bool) -> &'static str {
    if enabled {
        "read4me – Listening"
    } else {
        "read4me – Paused"
    }
}

/// Menu bar icon: a filled disc, dimmed while paused
#[must_use]
pub fn icon_rgba(enabled: bool) -> Vec<u8> {
    let alpha: u8 = if enabled { 255 } else { 96 };
    let center = f64::from(ICON_SIZE) / 2.0;
    let radius = 8.0_f64;

    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for y in 0..ICON_SIZE {
        for x in 0..ICON_SIZE {
            let dx = f64::from(x) + 0.5 - center;
            let dy = f64::from(y) + 0.5 - center;
            let inside = dx.hypot(dy) <= radius;
            rgba.extend_from_slice(&[0, 0, 0, if inside { alpha } else { 0 }]);
        }
    }
    rgba
}

/// Open `url` in the default browser
///
/// Blocks until the launcher has handed the link over and exited.
///
/// # Errors
/// Returns error for non-web links or if the launcher fails
pub fn open_url(url: &str) -> Result<()> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!("refusing to open non-web link: {url}");
    }
    open::that(url).with_context(|| format!("failed to open {url}"))
}
