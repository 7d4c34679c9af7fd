//! The side a switch moves the shared peripherals to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which machine should own the peripherals after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchTarget {
    /// The physical host running the daemon.
    Host,
    /// The virtual machine the devices are passed through to.
    Guest,
}

impl SwitchTarget {
    /// Wire name, as used in the `to` field of a transition request.
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchTarget::Host => "host",
            SwitchTarget::Guest => "guest",
        }
    }
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names neither side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown switch target {0:?}; expected \"host\" or \"guest\"")]
pub struct TargetParseError(pub String);

impl FromStr for SwitchTarget {
    type Err = TargetParseError;

    /// Exact, case-sensitive match on the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(SwitchTarget::Host),
            "guest" => Ok(SwitchTarget::Guest),
            other => Err(TargetParseError(other.to_string())),
        }
    }
}
