//! `virsh`-driven hostdev manager.
//!
//! Every operation is one `virsh` invocation against the configured
//! connection URI and domain:
//!
//! | Operation        | Invocation                                              |
//! |------------------|---------------------------------------------------------|
//! | `list_attached`  | `virsh -c URI dumpxml DOMAIN`                           |
//! | `attach`         | `virsh -c URI attach-device DOMAIN /dev/stdin --live`   |
//! | `detach`         | `virsh -c URI detach-device DOMAIN /dev/stdin --live`   |
//!
//! The hostdev fragment is written to the child's stdin.  Each call is bounded
//! by a timeout and the child is killed if it overruns.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use kvm_switch_core::{parse_attached_usb_devices, render_usb_hostdev, DeviceIdentity};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::application::switch_engine::{HostdevManager, HostdevOperation, HypervisorError};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one finished `virsh` call.
struct CallOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

pub struct VirshHostdevManager {
    program: String,
    leading_args: Vec<String>,
    uri: String,
    domain: String,
    timeout: Duration,
}

impl VirshHostdevManager {
    pub fn new(uri: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            program: "virsh".to_string(),
            leading_args: Vec::new(),
            uri: uri.into(),
            domain: domain.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Runs `program leading_args.. -c URI ...` instead of `virsh -c URI ...`.
    pub fn with_command(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments after the program name for one subcommand.
    fn args(&self, subcommand: &str) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-c".to_string(),
            self.uri.clone(),
            subcommand.to_string(),
            self.domain.clone(),
        ]);
        if subcommand != "dumpxml" {
            args.extend(["/dev/stdin".to_string(), "--live".to_string()]);
        }
        args
    }

    async fn call(&self, subcommand: &str, stdin: Option<String>) -> Result<CallOutput, HypervisorError> {
        let args = self.args(subcommand);
        debug!("running {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HypervisorError::Connection(format!("could not run {}: {e}", self.program)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| HypervisorError::Connection(format!("could not write to virsh: {e}")))?;
            // Closing stdin lets virsh see end of file.
            drop(pipe);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| HypervisorError::Timeout(self.timeout))?
            .map_err(|e| HypervisorError::Connection(format!("virsh did not finish: {e}")))?;

        Ok(CallOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn mutate(
        &self,
        operation: HostdevOperation,
        device: DeviceIdentity,
    ) -> Result<(), HypervisorError> {
        let subcommand = match operation {
            HostdevOperation::Attach => "attach-device",
            HostdevOperation::Detach => "detach-device",
        };
        let out = self.call(subcommand, Some(render_usb_hostdev(device))).await?;
        if out.success {
            Ok(())
        } else {
            Err(HypervisorError::Rejected {
                operation,
                device,
                reason: out.stderr,
            })
        }
    }
}

#[async_trait]
impl HostdevManager for VirshHostdevManager {
    async fn list_attached(&self) -> Result<Vec<DeviceIdentity>, HypervisorError> {
        let out = self.call("dumpxml", None).await?;
        if !out.success {
            return Err(HypervisorError::Connection(out.stderr));
        }
        parse_attached_usb_devices(&out.stdout)
            .map_err(|e| HypervisorError::Description(e.to_string()))
    }

    async fn attach(&self, device: DeviceIdentity) -> Result<(), HypervisorError> {
        self.mutate(HostdevOperation::Attach, device).await
    }

    async fn detach(&self, device: DeviceIdentity) -> Result<(), HypervisorError> {
        self.mutate(HostdevOperation::Detach, device).await
    }
}
