//! Recording command runner for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::switch_engine::{CommandError, CommandRunner};

#[derive(Debug, Default)]
pub struct MockCommandRunner {
    pub calls: Mutex<Vec<String>>,
    pub should_fail: bool,
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, command: &str) -> Result<(), CommandError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push(command.to_string());
        if self.should_fail {
            return Err(CommandError::ExitStatus {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}
