//! Infrastructure layer for the switch daemon.
//!
//! Contains OS-facing adapters: the `virsh` hostdev manager, the `ddcutil`
//! display controller, the shell command runner, the evdev keyboard reader,
//! the axum HTTP surface, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `kvm_switch_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod commands;
pub mod display;
pub mod http;
pub mod hypervisor;
pub mod input_device;
pub mod storage;
