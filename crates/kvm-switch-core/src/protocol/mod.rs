//! JSON bodies exchanged with the control endpoint.
//!
//! Request:
//!
//! ```json
//! { "to": "guest", "skip_optional": true }
//! ```
//!
//! Response once the request is accepted (HTTP 200).  `success` stays
//! `true`; a transition that failed inside the engine only fills `error`:
//!
//! ```json
//! { "success": true, "error": "hypervisor rejected attach of 046d:c52b: ..." }
//! ```
//!
//! Requests refused before reaching the engine (bad secret, malformed body)
//! answer with `success: false`.

use serde::{Deserialize, Serialize};

use crate::domain::target::SwitchTarget;

/// A transition request.
///
/// Deserialization is the validation step: a body without `to`, with a `to`
/// other than `"host"`/`"guest"`, or that is not a JSON object fails to
/// parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub to: SwitchTarget,
    #[serde(default)]
    pub skip_optional: bool,
}

impl SwitchRequest {
    /// Parses a raw request body.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error describing why the body is malformed.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Body returned by the control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl SwitchResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// Accepted request whose transition failed.
    pub fn switch_failed(error: impl Into<String>) -> Self {
        Self {
            success: true,
            error: Some(error.into()),
        }
    }

    /// Request refused before any transition was attempted.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
