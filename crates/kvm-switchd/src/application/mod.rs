//! Application layer use cases for the switch daemon.
//!
//! Use cases in this layer orchestrate domain objects from `kvm_switch_core`
//! and depend only on traits (ports) for anything that touches the outside
//! world: the hypervisor, the monitors, shell commands, and the keyboard.
//! Concrete adapters live in `infrastructure` and are injected at startup.
//!
//! # Sub-modules
//!
//! - **`switch_engine`** – Moves the whole peripheral set to the host or the
//!   guest by reconciling against the live hypervisor device list.
//!
//! - **`dispatcher`** – The single serialization point in front of the
//!   engine.  Both trigger sources submit requests to one worker task, so at
//!   most one transition runs at a time and a request that arrives mid-flight
//!   is queued rather than interleaved.
//!
//! - **`hotkey_monitor`** – Blocking event loop that reads a raw keyboard,
//!   recognises the Ctrl+Ctrl gesture, probes for the guest handing the
//!   device back, and reopens the device after it disappears.
//!
//! - **`control_endpoint`** – Authenticates and validates an external
//!   transition request before handing it to the dispatcher.

pub mod control_endpoint;
pub mod dispatcher;
pub mod hotkey_monitor;
pub mod switch_engine;
