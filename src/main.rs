use anyhow::{Context, Result};
use std::sync::Arc;

use read4me::config::Config;
use read4me::input::hotkey::{GlobalHotkeyRegistrar, HotkeyGate, TriggerHandler};
use read4me::pipeline::SpeakSelection;
use read4me::{permissions, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.read4me.toml");

    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("read4me starting");

    if permissions::warn_missing_permissions() {
        println!("✓ Accessibility OK");
    } else {
        println!(
            "⚠ Accessibility permission missing: \
             System Settings → Privacy & Security → Accessibility"
        );
    }

    let pipeline = Arc::new(SpeakSelection::from_config(&config));

    println!("Select text anywhere, then use:");
    println!("  {} : Speak selection", config.hotkey.speak);
    println!("  {} : Stop", config.hotkey.stop);
    println!("Press Ctrl+C to exit.\n");

    event_loop::run(config, pipeline)
}

/// Register the chords and enable them if configured to start listening
fn hotkey_gate(config: &Config, pipeline: &Arc<SpeakSelection>) -> Result<HotkeyGate> {
    let registrar =
        GlobalHotkeyRegistrar::new(&config.hotkey).context("invalid hotkey configuration")?;
    let handler: Arc<dyn TriggerHandler> = Arc::clone(pipeline) as Arc<dyn TriggerHandler>;
    let mut gate = HotkeyGate::new(Box::new(registrar), handler, config.capture.debounce());

    if config.hotkey.enabled_on_launch {
        gate.start().context("failed to enable hotkeys")?;
    }
    Ok(gate)
}

#[cfg(target_os = "macos")]
mod event_loop {
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tao::event::{Event, StartCause};
    use tao::event_loop::{ControlFlow, EventLoopBuilder};
    use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};

    use read4me::config::Config;
    use read4me::pipeline::SpeakSelection;
    use read4me::tray::TrayManager;

    /// How often pending menu commands are applied
    const MENU_POLL: Duration = Duration::from_millis(10);

    enum AppEvent {
        Interrupt,
    }

    /// Run the AppKit event loop on the main thread until quit or Ctrl+C
    ///
    /// Hotkey presses and menu clicks are only delivered while this loop runs.
    pub fn run(config: Config, pipeline: Arc<SpeakSelection>) -> Result<()> {
        let mut event_loop = EventLoopBuilder::<AppEvent>::with_user_event().build();
        // Menu bar only, no Dock icon
        event_loop.set_activation_policy(ActivationPolicy::Accessory);

        let proxy = event_loop.create_proxy();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = proxy.send_event(AppEvent::Interrupt);
            }
        });

        // The hotkey manager needs the event loop to exist first
        let mut gate = super::hotkey_gate(&config, &pipeline)?;
        let mut tray: Option<TrayManager> = None;
        let mut quitting = false;

        tracing::info!("event loop starting");
        event_loop.run(move |event, _, control_flow| {
            match event {
                // The status item can only be created once the app is running
                Event::NewEvents(StartCause::Init) if config.ui.menu_bar => {
                    match TrayManager::new(gate.is_enabled(), &config.ui.docs_url) {
                        Ok(manager) => tray = Some(manager),
                        Err(e) => tracing::error!(error = %e, "failed to show menu bar icon"),
                    }
                }
                Event::UserEvent(AppEvent::Interrupt) => {
                    tracing::info!("shutdown signal received");
                    println!("\n[exit] Bye.");
                    quitting = true;
                }
                Event::LoopDestroyed => {
                    pipeline.shutdown(&mut gate);
                    return;
                }
                _ => {}
            }

            if !quitting && tray.as_mut().is_some_and(|t| t.handle_events(&mut gate)) {
                tracing::info!("quit from menu bar");
                quitting = true;
            }

            *control_flow = if quitting {
                ControlFlow::Exit
            } else {
                ControlFlow::WaitUntil(Instant::now() + MENU_POLL)
            };
        })
    }
}

#[cfg(not(target_os = "macos"))]
mod event_loop {
    use anyhow::Result;
    use std::sync::Arc;

    use read4me::config::Config;
    use read4me::pipeline::SpeakSelection;

    /// Listen for hotkeys headless until Ctrl+C
    #[allow(clippy::needless_pass_by_value)] // Same signature as the macOS event loop
    pub fn run(config: Config, pipeline: Arc<SpeakSelection>) -> Result<()> {
        if config.ui.menu_bar {
            tracing::info!("menu bar is only available on macOS, running headless");
        }
        let mut gate = super::hotkey_gate(&config, &pipeline)?;

        let (interrupted, wait) = std::sync::mpsc::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = interrupted.send(());
            }
        });

        tracing::info!("waiting for hotkeys");
        // Sender dropped means the signal handler failed; shut down either way
        let _ = wait.recv();
        tracing::info!("shutdown signal received");
        println!("\n[exit] Bye.");

        pipeline.shutdown(&mut gate);
        Ok(())
    }
}
