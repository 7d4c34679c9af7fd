//! kvm-switchd: the switch daemon's process supervisor.
//!
//! Loads the configuration, builds the Switch Engine on top of the `virsh`,
//! `ddcutil` and shell adapters, moves it into the dispatcher worker, and
//! starts whichever trigger surfaces the configuration enables.
//!
//! # Usage
//!
//! ```text
//! kvm-switchd --config <PATH> [--log-level <LEVEL>]
//! ```
//!
//! | Variable            | Description                                   |
//! |---------------------|-----------------------------------------------|
//! | `KVM_SWITCH_CONFIG` | Path of the TOML configuration file           |
//! | `KVM_SWITCH_LOG`    | Log level, overriding `log_level` in the file |
//! | `RUST_LOG`          | Full `tracing` filter, overriding both        |
//!
//! # Runtime layout
//!
//! ```text
//!   hotkey thread (evdev) ──┐
//!                           ├──► dispatcher worker ──► SwitchEngine
//!   axum task (POST /switch)┘        (one transition at a time)
//! ```
//!
//! Ctrl+C stops the HTTP server gracefully and ends the process.  The hotkey
//! thread blocks on the device and simply ends with the process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kvm_switchd::application::control_endpoint::ControlEndpoint;
use kvm_switchd::application::dispatcher::{spawn_switch_worker, SwitchHandle};
use kvm_switchd::application::switch_engine::SwitchEngine;
use kvm_switchd::infrastructure::commands::shell::ShellCommandRunner;
use kvm_switchd::infrastructure::display::ddcutil::DdcutilDisplayController;
use kvm_switchd::infrastructure::http::serve;
use kvm_switchd::infrastructure::hypervisor::virsh::VirshHostdevManager;
use kvm_switchd::infrastructure::storage::config::{load_config, HotkeySettings};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hands a keyboard, mouse and monitors between the host and a libvirt guest.
#[derive(Debug, Parser)]
#[command(
    name = "kvm-switchd",
    about = "Software KVM switch for libvirt guests with USB pass-through",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "KVM_SWITCH_CONFIG")]
    config: PathBuf,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`).
    ///
    /// Overrides `log_level` from the configuration file.  `RUST_LOG`, when
    /// set, wins over both.
    #[arg(long, env = "KVM_SWITCH_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Picks the log filter: the CLI flag if given, else the file's level.
    fn log_filter(&self, configured: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| configured.to_string())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    let level = cli.log_filter(&settings.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    info!(
        uri = %settings.hypervisor.uri,
        domain = %settings.hypervisor.domain,
        devices = settings.profile.devices.len(),
        displays = settings.profile.displays.len(),
        "kvm-switchd starting"
    );

    // ── Engine and serialization point ────────────────────────────────────────
    let hostdevs = VirshHostdevManager::new(
        settings.hypervisor.uri.clone(),
        settings.hypervisor.domain.clone(),
    );
    let engine = SwitchEngine::new(
        settings.profile,
        Arc::new(hostdevs),
        Arc::new(DdcutilDisplayController::new()),
        Arc::new(ShellCommandRunner::new()),
    );
    let (switcher, _worker) = spawn_switch_worker(engine);

    // ── Trigger surfaces ──────────────────────────────────────────────────────
    let hotkey_enabled = settings.hotkey.is_some();
    if let Some(hotkey) = settings.hotkey {
        spawn_hotkey_monitor(hotkey, switcher.clone())?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let http_task = settings.http.map(|http| {
        let endpoint = Arc::new(ControlEndpoint::new(http.secret, Arc::new(switcher.clone())));
        tokio::spawn(serve(http.bind, endpoint, shutdown_rx))
    });

    if !hotkey_enabled && http_task.is_none() {
        warn!("neither [http] nor [evdev] is enabled; idling until Ctrl+C");
    }

    // ── Wait for shutdown ─────────────────────────────────────────────────────
    match http_task {
        Some(mut task) => {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for Ctrl+C")?;
                    info!("received Ctrl+C, shutting down");
                    let _ = shutdown_tx.send(true);
                    task.await
                        .context("control endpoint task panicked")?
                        .context("control endpoint failed")?;
                }
                finished = &mut task => {
                    finished
                        .context("control endpoint task panicked")?
                        .context("control endpoint failed")?;
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
            info!("received Ctrl+C, shutting down");
        }
    }

    info!("kvm-switchd stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
fn spawn_hotkey_monitor(settings: HotkeySettings, switcher: SwitchHandle) -> anyhow::Result<()> {
    use kvm_switchd::application::hotkey_monitor::HotkeyMonitor;
    use kvm_switchd::infrastructure::input_device::evdev::EvdevOpener;

    let monitor = HotkeyMonitor::new(EvdevOpener::new(settings.device), switcher);
    std::thread::Builder::new()
        .name("hotkey-monitor".to_string())
        .spawn(move || monitor.run())
        .context("failed to start the hotkey monitor thread")?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn spawn_hotkey_monitor(settings: HotkeySettings, _switcher: SwitchHandle) -> anyhow::Result<()> {
    warn!(
        "evdev hotkeys need Linux; ignoring {}",
        settings.device.display()
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
