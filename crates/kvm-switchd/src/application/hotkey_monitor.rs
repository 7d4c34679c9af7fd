//! Hotkey Monitor: the keyboard-driven trigger.
//!
//! Runs on a dedicated OS thread for the lifetime of the process.  Each
//! iteration waits a bounded time for key events from one raw input device
//! and feeds them to the [`HotkeyTracker`].  When the tracker reports the
//! Ctrl+Ctrl gesture the monitor asks the dispatcher for a guest switch.
//!
//! While the guest holds the peripherals no events arrive.  Every idle poll
//! in that state runs a grab probe: if this process can take exclusive
//! ownership of the device, the guest has let go and the monitor asks for a
//! host switch.  The probe is a heuristic and only as reliable as the
//! guest's grab behaviour.
//!
//! A hard device error (unplug, permission change) drops the device and
//! re-opens the same path every `reconnect_interval` until it succeeds.

use std::time::Duration;

use kvm_switch_core::{HotkeyAction, HotkeyTracker, KeyEvent, SwitchTarget};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::dispatcher::BlockingSwitcher;

/// Default wait between reopen attempts after the device is lost.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default bounded wait for events before the loop rechecks grab status.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Error type for the raw input device.  Never fatal to the monitor.
#[derive(Debug, Error)]
pub enum InputDeviceError {
    #[error("failed to open input device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input device: {0}")]
    Read(#[source] std::io::Error),
}

/// Result of one bounded wait on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPoll {
    /// Key transitions that arrived, in order.
    Events(Vec<KeyEvent>),
    /// Nothing arrived within the timeout.
    Idle,
}

/// An open raw input device.
pub trait KeyInput {
    /// Waits at most `timeout` for key events.
    ///
    /// # Errors
    ///
    /// Returns [`InputDeviceError::Read`] when the device is gone.
    fn poll(&mut self, timeout: Duration) -> Result<InputPoll, InputDeviceError>;

    /// Tries to take exclusive ownership of the device and immediately gives
    /// it back.  Returns `true` if the acquisition succeeded.
    fn probe_grab(&mut self) -> bool;
}

/// Opens (and re-opens) the configured device.
pub trait KeyInputOpener {
    type Input: KeyInput;

    fn open(&self) -> Result<Self::Input, InputDeviceError>;

    /// Human-readable device name for logs.
    fn describe(&self) -> String;
}

/// The hotkey event loop.
pub struct HotkeyMonitor<O: KeyInputOpener, S: BlockingSwitcher> {
    opener: O,
    switcher: S,
    tracker: HotkeyTracker,
    reconnect_interval: Duration,
    poll_timeout: Duration,
}

impl<O: KeyInputOpener, S: BlockingSwitcher> HotkeyMonitor<O, S> {
    pub fn new(opener: O, switcher: S) -> Self {
        Self {
            opener,
            switcher,
            tracker: HotkeyTracker::new(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn tracker(&self) -> &HotkeyTracker {
        &self.tracker
    }

    /// Runs forever.
    pub fn run(mut self) {
        let mut input = self.open_with_retry();
        info!("hotkey monitor listening on {}", self.opener.describe());
        loop {
            let err = self.run_session(&mut input);
            warn!("lost input device {}: {err}", self.opener.describe());
            input = self.reconnect();
        }
    }

    /// Processes events until the device fails, returning the failure.
    pub fn run_session(&mut self, input: &mut O::Input) -> InputDeviceError {
        loop {
            if let Err(e) = self.step(input) {
                return e;
            }
        }
    }

    /// Re-opens the device after a hard error and forgets the key state
    /// seen on the old handle.
    pub fn reconnect(&mut self) -> O::Input {
        let input = self.open_with_retry();
        self.tracker.reset_after_reconnect();
        info!(
            grabbed = self.tracker.is_grabbed(),
            "reconnected to input device {}",
            self.opener.describe()
        );
        input
    }

    /// One bounded wait plus whatever switching it leads to.
    ///
    /// # Errors
    ///
    /// Propagates hard device errors from [`KeyInput::poll`].
    pub fn step(&mut self, input: &mut O::Input) -> Result<(), InputDeviceError> {
        match input.poll(self.poll_timeout)? {
            InputPoll::Events(events) => {
                for event in events {
                    if let Some(action) = self.tracker.handle_key(event) {
                        self.perform(action);
                    }
                }
            }
            InputPoll::Idle => {
                if self.tracker.is_grabbed() && input.probe_grab() {
                    debug!("grab probe succeeded; guest released the keyboard");
                    if self.tracker.release_confirmed() {
                        self.switch(SwitchTarget::Host, false);
                    }
                }
            }
        }
        Ok(())
    }

    fn perform(&self, action: HotkeyAction) {
        match action {
            HotkeyAction::SwitchToGuest { skip_optional } => {
                info!(skip_optional, "hotkey pressed; switching to guest");
                self.switch(SwitchTarget::Guest, skip_optional);
            }
        }
    }

    fn switch(&self, target: SwitchTarget, skip_optional: bool) {
        if let Err(e) = self.switcher.switch_to_blocking(target, skip_optional) {
            error!("hotkey switch to {target} failed: {e}");
        }
    }

    fn open_with_retry(&self) -> O::Input {
        loop {
            match self.opener.open() {
                Ok(input) => return input,
                Err(e) => {
                    warn!("{e}; retrying in {:?}", self.reconnect_interval);
                    std::thread::sleep(self.reconnect_interval);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
