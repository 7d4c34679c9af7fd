//! Monitor input-select targets.

use super::target::SwitchTarget;

/// One physical monitor driven over its DDC/CI control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTarget {
    /// I2C bus number the monitor is reachable on (`ddcutil --bus`).
    pub bus: u32,
    /// VCP feature code to write; `0x60` is "input source" on most monitors.
    pub feature: u8,
    /// Input-select value that shows the host.
    pub host_input: u16,
    /// Input-select value that shows the guest.
    pub guest_input: u16,
}

impl DisplayTarget {
    /// Returns the input-select value for `target`.
    pub fn input_for(&self, target: SwitchTarget) -> u16 {
        match target {
            SwitchTarget::Host => self.host_input,
            SwitchTarget::Guest => self.guest_input,
        }
    }
}
