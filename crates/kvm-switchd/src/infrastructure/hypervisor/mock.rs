//! In-memory hostdev manager for tests.
//!
//! Behaves like a running domain: attach appends to the live list, detach
//! removes from it, and detaching something that is not attached is refused
//! the way libvirt refuses it.

use std::sync::Mutex;

use async_trait::async_trait;
use kvm_switch_core::DeviceIdentity;

use crate::application::switch_engine::{HostdevManager, HostdevOperation, HypervisorError};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostdevCall {
    List,
    Attach(DeviceIdentity),
    Detach(DeviceIdentity),
}

#[derive(Debug, Default)]
pub struct MockHypervisor {
    attached: Mutex<Vec<DeviceIdentity>>,
    calls: Mutex<Vec<HostdevCall>>,
    fail_on: Mutex<Option<DeviceIdentity>>,
    unavailable: bool,
}

impl MockHypervisor {
    pub fn with_attached(devices: impl IntoIterator<Item = DeviceIdentity>) -> Self {
        Self {
            attached: Mutex::new(devices.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Attach or detach of `device` is rejected until [`Self::clear_failure`].
    pub fn failing_on(device: DeviceIdentity) -> Self {
        Self {
            fail_on: Mutex::new(Some(device)),
            ..Default::default()
        }
    }

    /// Every call fails with a connection error.
    pub fn offline() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Snapshot of the live list.
    pub fn attached(&self) -> Vec<DeviceIdentity> {
        self.attached.lock().expect("lock poisoned").clone()
    }

    pub fn calls(&self) -> Vec<HostdevCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Stops rejecting `fail_on`, as if the operator fixed the problem.
    pub fn clear_failure(&self) {
        *self.fail_on.lock().expect("lock poisoned") = None;
    }

    fn record(&self, call: HostdevCall) -> Result<(), HypervisorError> {
        self.calls.lock().expect("lock poisoned").push(call);
        if self.unavailable {
            return Err(HypervisorError::Connection(
                "failed to connect to the hypervisor".to_string(),
            ));
        }
        Ok(())
    }

    fn rejects(&self, device: DeviceIdentity) -> bool {
        *self.fail_on.lock().expect("lock poisoned") == Some(device)
    }
}

#[async_trait]
impl HostdevManager for MockHypervisor {
    async fn list_attached(&self) -> Result<Vec<DeviceIdentity>, HypervisorError> {
        self.record(HostdevCall::List)?;
        Ok(self.attached())
    }

    async fn attach(&self, device: DeviceIdentity) -> Result<(), HypervisorError> {
        self.record(HostdevCall::Attach(device))?;
        if self.rejects(device) {
            return Err(HypervisorError::Rejected {
                operation: HostdevOperation::Attach,
                device,
                reason: "device is busy".to_string(),
            });
        }
        self.attached.lock().expect("lock poisoned").push(device);
        Ok(())
    }

    async fn detach(&self, device: DeviceIdentity) -> Result<(), HypervisorError> {
        self.record(HostdevCall::Detach(device))?;
        let mut attached = self.attached.lock().expect("lock poisoned");
        let position = attached.iter().position(|d| *d == device);
        match position {
            Some(index) if !self.rejects(device) => {
                attached.remove(index);
                Ok(())
            }
            _ => Err(HypervisorError::Rejected {
                operation: HostdevOperation::Detach,
                device,
                reason: "device not found".to_string(),
            }),
        }
    }
}
