//! Runs configured commands through `sh -c`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::application::switch_engine::{CommandError, CommandRunner};

#[derive(Debug, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str) -> Result<(), CommandError> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| CommandError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::ExitStatus {
                command: command.to_string(),
                status: status.to_string(),
            })
        }
    }
}
