//! Raw keyboard adapters for the hotkey monitor.
//!
//! On Linux [`evdev::EvdevOpener`] reads a `/dev/input/event*` node.  The
//! [`mock`] module scripts polls, grab probes and reopen failures for tests.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod evdev;
