//! # kvm-switch-core
//!
//! Shared library for kvm-switch containing the domain entities, the
//! hypervisor device-description format, the hotkey state machine, and the
//! JSON transition messages.
//!
//! This crate has zero dependencies on OS APIs, subprocesses, or network
//! sockets.  Everything here can be unit-tested without a hypervisor, a
//! monitor, or a keyboard attached.
//!
//! # Architecture overview
//!
//! kvm-switch is a "poor man's KVM switch" for VFIO users: a single keyboard,
//! mouse and set of monitors are shared between the host and one running
//! libvirt guest.  A switch moves USB pass-through devices into or out of the
//! guest, flips the monitors' input source, and runs a few side-effect
//! commands.
//!
//! - **`domain`** – Device identities, the configured requirement set, display
//!   targets and the switch target (host or guest).
//!
//! - **`hostdev`** – How a single USB pass-through device is described to the
//!   hypervisor, and how the list of currently attached devices is read back
//!   out of a domain description document.
//!
//! - **`hotkey`** – The pressed-key bookkeeping and the debouncing state
//!   machine that turns raw key events into "switch to guest" / "probe for
//!   host" decisions.
//!
//! - **`protocol`** – The JSON request and response bodies of the control
//!   endpoint.

pub mod domain;
pub mod hostdev;
pub mod hotkey;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kvm_switch_core::DeviceIdentity` instead of the full module path.
pub use domain::device::{DeviceIdentity, DeviceRequirement, DeviceSelection};
pub use domain::display::DisplayTarget;
pub use domain::target::{SwitchTarget, TargetParseError};
pub use hostdev::{parse_attached_usb_devices, render_usb_hostdev, HostdevParseError};
pub use hotkey::{HotkeyAction, HotkeyState, HotkeyTracker, KeyEvent, PressedKeySet};
pub use protocol::{SwitchRequest, SwitchResponse};
