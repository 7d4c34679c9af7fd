//! Scripted input devices for unit testing.
//!
//! Allows tests to drive the hotkey monitor through key events, idle polls,
//! grab probes and device loss without a keyboard attached.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::application::hotkey_monitor::{InputDeviceError, InputPoll, KeyInput, KeyInputOpener};

/// A device that replays a fixed list of poll results.
///
/// Once the script is exhausted every poll fails with a read error, which
/// ends the monitor's session the way an unplug would.
#[derive(Debug, Default)]
pub struct MockKeyInput {
    polls: VecDeque<Result<InputPoll, InputDeviceError>>,
    grabs: VecDeque<bool>,
    probes: usize,
}

impl MockKeyInput {
    pub fn new(polls: Vec<Result<InputPoll, InputDeviceError>>) -> Self {
        Self {
            polls: polls.into(),
            ..Default::default()
        }
    }

    /// Results of successive grab probes; probes past the end fail.
    pub fn with_grab_results(mut self, grabs: Vec<bool>) -> Self {
        self.grabs = grabs.into();
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes
    }
}

impl KeyInput for MockKeyInput {
    fn poll(&mut self, _timeout: Duration) -> Result<InputPoll, InputDeviceError> {
        self.polls.pop_front().unwrap_or_else(|| {
            Err(InputDeviceError::Read(io::Error::new(
                io::ErrorKind::NotFound,
                "no such device",
            )))
        })
    }

    fn probe_grab(&mut self) -> bool {
        self.probes += 1;
        self.grabs.pop_front().unwrap_or(false)
    }
}

/// An opener that hands out prepared devices in order.
///
/// `None` entries fail to open.  Opening past the end of the script panics.
#[derive(Debug, Default)]
pub struct ScriptedOpener {
    devices: Mutex<VecDeque<Option<MockKeyInput>>>,
    opens: Mutex<usize>,
}

impl ScriptedOpener {
    pub fn new(devices: Vec<Option<MockKeyInput>>) -> Self {
        Self {
            devices: Mutex::new(devices.into()),
            opens: Mutex::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        *self.opens.lock().expect("lock poisoned")
    }
}

impl KeyInputOpener for ScriptedOpener {
    type Input = MockKeyInput;

    fn open(&self) -> Result<MockKeyInput, InputDeviceError> {
        *self.opens.lock().expect("lock poisoned") += 1;
        let next = self
            .devices
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedOpener ran out of devices"));
        next.ok_or_else(|| InputDeviceError::Open {
            path: self.describe(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
        })
    }

    fn describe(&self) -> String {
        "mock-keyboard".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvm_switch_core::KeyEvent;

    #[test]
    fn test_mock_input_replays_then_fails() {
        // Arrange
        let mut input = MockKeyInput::new(vec![Ok(InputPoll::Events(vec![KeyEvent::press(29)]))]);

        // Act
        let first = input.poll(Duration::ZERO);
        let second = input.poll(Duration::ZERO);

        // Assert
        assert!(matches!(first, Ok(InputPoll::Events(_))));
        assert!(matches!(second, Err(InputDeviceError::Read(_))));
    }

    #[test]
    fn test_scripted_opener_counts_attempts() {
        let opener = ScriptedOpener::new(vec![None, Some(MockKeyInput::default())]);

        assert!(opener.open().is_err());
        assert!(opener.open().is_ok());
        assert_eq!(opener.open_count(), 2);
    }
}
