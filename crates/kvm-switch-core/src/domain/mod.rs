//! Domain entities for kvm-switch.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Code in outer layers (application, infrastructure) depends
//! on the domain, but the domain never depends on them.
//!
//! Note what is *not* here: there is no "current side" value.  Which machine
//! owns the peripherals is never stored; every transition re-derives its
//! starting point from a live hypervisor query.

/// USB device identities and the configured requirement set.
pub mod device;

/// Monitor input-select targets.
pub mod display;

/// The two sides a switch can move the peripherals to.
pub mod target;
