//! `ddcutil`-driven display controller.
//!
//! One call is `ddcutil --bus B setvcp 0xFF 0xVV`.  Monitors that are off or
//! unplugged make ddcutil fail; the engine treats that as a soft failure.

use std::process::Stdio;

use async_trait::async_trait;
use kvm_switch_core::DisplayTarget;
use tokio::process::Command;
use tracing::debug;

use crate::application::switch_engine::{DisplayController, DisplayError};

pub struct DdcutilDisplayController {
    program: String,
}

impl DdcutilDisplayController {
    pub fn new() -> Self {
        Self::with_program("ddcutil")
    }

    /// Uses `program` in place of `ddcutil`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DdcutilDisplayController {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for one input-select write.
pub fn setvcp_args(display: &DisplayTarget, value: u16) -> Vec<String> {
    vec![
        "--bus".to_string(),
        display.bus.to_string(),
        "setvcp".to_string(),
        format!("{:#04x}", display.feature),
        format!("{value:#04x}"),
    ]
}

#[async_trait]
impl DisplayController for DdcutilDisplayController {
    async fn select_input(&self, display: &DisplayTarget, value: u16) -> Result<(), DisplayError> {
        let args = setvcp_args(display, value);
        debug!("running {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| DisplayError::Spawn {
                bus: display.bus,
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(DisplayError::ExitStatus {
                bus: display.bus,
                status: status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> DisplayTarget {
        DisplayTarget {
            bus: 4,
            feature: 0x60,
            host_input: 0x0f,
            guest_input: 0x11,
        }
    }

    #[test]
    fn test_setvcp_args_use_two_digit_hex() {
        assert_eq!(
            setvcp_args(&monitor(), 0x0f),
            vec!["--bus", "4", "setvcp", "0x60", "0x0f"]
        );
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let ddc = DdcutilDisplayController::with_program("true");

        assert!(ddc.select_input(&monitor(), 0x11).await.is_ok());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_with_bus() {
        let ddc = DdcutilDisplayController::with_program("false");

        let result = ddc.select_input(&monitor(), 0x11).await;

        assert!(matches!(result, Err(DisplayError::ExitStatus { bus: 4, .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let ddc = DdcutilDisplayController::with_program("/nonexistent/ddcutil");

        let result = ddc.select_input(&monitor(), 0x11).await;

        assert!(matches!(result, Err(DisplayError::Spawn { bus: 4, .. })));
    }
}
