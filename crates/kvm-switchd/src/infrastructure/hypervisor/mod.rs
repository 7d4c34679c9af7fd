//! Hostdev manager adapters.
//!
//! [`virsh::VirshHostdevManager`] drives a running libvirt domain through the
//! `virsh` command-line client.  [`mock::MockHypervisor`] keeps the attached
//! list in memory for tests.

pub mod mock;
pub mod virsh;
