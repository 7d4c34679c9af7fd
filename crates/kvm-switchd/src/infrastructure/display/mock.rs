//! Recording display controller for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use kvm_switch_core::DisplayTarget;

use crate::application::switch_engine::{DisplayController, DisplayError};

#[derive(Debug, Default)]
pub struct MockDisplayController {
    /// `(bus, value)` for every call, failed ones included.
    pub calls: Mutex<Vec<(u32, u16)>>,
    pub should_fail: bool,
}

#[async_trait]
impl DisplayController for MockDisplayController {
    async fn select_input(&self, display: &DisplayTarget, value: u16) -> Result<(), DisplayError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push((display.bus, value));
        if self.should_fail {
            return Err(DisplayError::ExitStatus {
                bus: display.bus,
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}
