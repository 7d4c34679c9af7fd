//! SwitchEngine: moves the shared peripherals between host and guest.
//!
//! A transition runs three stages in a fixed order:
//!
//! 1. Every configured monitor is told to show the target side.
//! 2. The side-effect commands configured for the target side are run.
//! 3. USB pass-through devices are reconciled against the live list the
//!    hypervisor reports: missing desired devices are attached for the guest,
//!    attached desired devices are detached for the host.
//!
//! Stages 1 and 2 are soft: failures are logged and collected in the
//! [`SwitchReport`] but never stop the transition.  Stage 3 is hard: the first
//! hypervisor error aborts the remaining device operations and is returned to
//! the caller.  Devices moved before the failure stay where they are; there is
//! no rollback.  Re-issuing the same transition is always safe because the
//! plan is recomputed from the live device list.
//!
//! The engine performs several non-atomic external calls and has no internal
//! locking; callers go through [`crate::application::dispatcher`] so that only
//! one transition runs at a time.

use std::sync::Arc;

use async_trait::async_trait;
use kvm_switch_core::{DeviceIdentity, DeviceSelection, DisplayTarget, SwitchTarget};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error type for hypervisor device operations.
#[derive(Debug, Error)]
pub enum HypervisorError {
    /// The management connection could not be used at all.
    #[error("hypervisor connection unavailable: {0}")]
    Connection(String),

    /// The domain description could not be read or understood.
    #[error("failed to read domain description: {0}")]
    Description(String),

    /// The hypervisor refused an attach or detach request.
    #[error("hypervisor rejected {operation} of {device}: {reason}")]
    Rejected {
        operation: HostdevOperation,
        device: DeviceIdentity,
        reason: String,
    },

    /// The hypervisor did not answer in time.
    #[error("hypervisor call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Which hostdev mutation a [`HypervisorError::Rejected`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostdevOperation {
    Attach,
    Detach,
}

impl std::fmt::Display for HostdevOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostdevOperation::Attach => f.write_str("attach"),
            HostdevOperation::Detach => f.write_str("detach"),
        }
    }
}

/// Error type for a monitor input-select call.  Always soft.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("could not run display control for bus {bus}: {reason}")]
    Spawn { bus: u32, reason: String },

    #[error("display control for bus {bus} exited with {status}")]
    ExitStatus { bus: u32, status: String },
}

/// Error type for a side-effect command.  Always soft.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not run command {command:?}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("command {command:?} exited with {status}")]
    ExitStatus { command: String, status: String },
}

/// Error type for a whole transition.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    /// The dispatcher worker is gone; no transition can run any more.
    #[error("switch worker has stopped")]
    WorkerStopped,
}

/// Queries and mutates the live USB hostdev list of one running domain.
///
/// Infrastructure implementation drives `virsh`; tests use
/// [`crate::infrastructure::hypervisor::mock::MockHypervisor`].
#[async_trait]
pub trait HostdevManager: Send + Sync {
    /// Returns the USB devices currently attached to the domain, re-queried
    /// on every call.
    async fn list_attached(&self) -> Result<Vec<DeviceIdentity>, HypervisorError>;

    /// Attaches one device to the running domain.
    async fn attach(&self, device: DeviceIdentity) -> Result<(), HypervisorError>;

    /// Detaches one device from the running domain.
    async fn detach(&self, device: DeviceIdentity) -> Result<(), HypervisorError>;
}

/// Sends an input-select value to one monitor.
#[async_trait]
pub trait DisplayController: Send + Sync {
    async fn select_input(&self, display: &DisplayTarget, value: u16) -> Result<(), DisplayError>;
}

/// Runs one configured side-effect command to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<(), CommandError>;
}

/// Everything the engine needs to know about the peripheral set.
///
/// Built once from the configuration file and moved into the engine.
#[derive(Debug, Clone, Default)]
pub struct SwitchProfile {
    pub devices: DeviceSelection,
    pub displays: Vec<DisplayTarget>,
    pub host_commands: Vec<String>,
    pub guest_commands: Vec<String>,
}

impl SwitchProfile {
    fn commands_for(&self, target: SwitchTarget) -> &[String] {
        match target {
            SwitchTarget::Host => &self.host_commands,
            SwitchTarget::Guest => &self.guest_commands,
        }
    }
}

/// What a successful transition did.
#[derive(Debug)]
pub struct SwitchReport {
    pub target: SwitchTarget,
    pub skip_optional: bool,
    /// Devices attached to the guest during this transition.
    pub attached: Vec<DeviceIdentity>,
    /// Devices detached from the guest during this transition.
    pub detached: Vec<DeviceIdentity>,
    pub display_failures: Vec<DisplayError>,
    pub command_failures: Vec<CommandError>,
}

impl SwitchReport {
    /// A report for a transition that has not done anything yet.
    pub fn empty(target: SwitchTarget, skip_optional: bool) -> Self {
        Self {
            target,
            skip_optional,
            attached: Vec::new(),
            detached: Vec::new(),
            display_failures: Vec::new(),
            command_failures: Vec::new(),
        }
    }

    /// `true` if any display or command step failed.
    pub fn has_soft_failures(&self) -> bool {
        !self.display_failures.is_empty() || !self.command_failures.is_empty()
    }
}

/// The Switch Engine.
pub struct SwitchEngine {
    profile: SwitchProfile,
    hostdevs: Arc<dyn HostdevManager>,
    displays: Arc<dyn DisplayController>,
    commands: Arc<dyn CommandRunner>,
}

impl SwitchEngine {
    pub fn new(
        profile: SwitchProfile,
        hostdevs: Arc<dyn HostdevManager>,
        displays: Arc<dyn DisplayController>,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            profile,
            hostdevs,
            displays,
            commands,
        }
    }

    /// Moves the peripherals to `target`.
    ///
    /// Idempotent: calling it again with the same arguments finds nothing
    /// left to attach or detach.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError::Hypervisor`] if the live device list cannot be
    /// read or a device operation is rejected.  Display and command failures
    /// are reported in the returned [`SwitchReport`] instead.
    pub async fn switch_to(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError> {
        let mut report = SwitchReport::empty(target, skip_optional);

        self.apply_displays(target, &mut report).await;
        self.run_commands(target, &mut report).await;

        let live = self.hostdevs.list_attached().await.map_err(|e| {
            error!("could not list attached devices: {e}");
            e
        })?;
        debug!("hypervisor reports {} attached usb device(s)", live.len());

        match target {
            SwitchTarget::Guest => {
                let plan = self.profile.devices.plan_attach(skip_optional, &live);
                for device in plan {
                    if let Err(e) = self.hostdevs.attach(device).await {
                        error!(
                            "attach of {device} failed after {} device(s) moved: {e}",
                            report.attached.len()
                        );
                        return Err(e.into());
                    }
                    info!("attached {device}");
                    report.attached.push(device);
                }
            }
            SwitchTarget::Host => {
                let plan = self.profile.devices.plan_detach(skip_optional, &live);
                for device in plan {
                    if let Err(e) = self.hostdevs.detach(device).await {
                        error!(
                            "detach of {device} failed after {} device(s) moved: {e}",
                            report.detached.len()
                        );
                        return Err(e.into());
                    }
                    info!("detached {device}");
                    report.detached.push(device);
                }
            }
        }

        Ok(report)
    }

    async fn apply_displays(&self, target: SwitchTarget, report: &mut SwitchReport) {
        for screen in &self.profile.displays {
            let value = screen.input_for(target);
            let bus = screen.bus;
            match self.displays.select_input(screen, value).await {
                Ok(()) => debug!("display on bus {bus} set to {value:#x}"),
                Err(e) => {
                    warn!("{e}");
                    report.display_failures.push(e);
                }
            }
        }
    }

    async fn run_commands(&self, target: SwitchTarget, report: &mut SwitchReport) {
        for command in self.profile.commands_for(target) {
            match self.commands.run(command).await {
                Ok(()) => debug!("command {command:?} finished"),
                Err(e) => {
                    warn!("{e}");
                    report.command_failures.push(e);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
