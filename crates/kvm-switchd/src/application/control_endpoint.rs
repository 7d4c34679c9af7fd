//! Control Endpoint: the network-facing trigger.
//!
//! Transport-agnostic: the axum adapter in
//! [`crate::infrastructure::http`] extracts the presented secret and the raw
//! body and hands them to [`ControlEndpoint::handle`].
//!
//! Checks run in a fixed order.  An unauthenticated request is rejected
//! before its body is even parsed; a malformed one is rejected before the
//! switch engine is reached.  Once a request is accepted the endpoint always
//! answers with a [`SwitchResponse`], carrying the engine's error text when
//! the transition failed.

use std::sync::Arc;

use kvm_switch_core::{SwitchRequest, SwitchResponse};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::dispatcher::Switcher;

/// Header that carries the shared secret.
pub const SECRET_HEADER: &str = "X-Secret";

/// Why a request was refused before reaching the switch engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing or invalid shared secret")]
    Unauthorized,

    #[error("malformed switch request: {0}")]
    Malformed(String),
}

/// Shared secret compared in constant time.
#[derive(Clone)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into().into_bytes())
    }

    /// Constant-time comparison.  The lengths themselves are not hidden.
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_slice().ct_eq(presented).into()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

pub struct ControlEndpoint {
    secret: Option<SharedSecret>,
    switcher: Arc<dyn Switcher>,
}

impl ControlEndpoint {
    /// `secret = None` disables authentication.
    pub fn new(secret: Option<String>, switcher: Arc<dyn Switcher>) -> Self {
        Self {
            secret: secret.map(SharedSecret::new),
            switcher,
        }
    }

    pub fn requires_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Authenticates, validates and runs one transition request.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Unauthorized`] if a secret is configured and
    ///   `presented` is absent or different.
    /// - [`RequestError::Malformed`] if `body` is not a valid
    ///   [`SwitchRequest`].
    ///
    /// Engine failures are not errors here; they come back as a
    /// [`SwitchResponse`] with `success = true` and the error text set.
    pub async fn handle(
        &self,
        presented: Option<&[u8]>,
        body: &[u8],
    ) -> Result<SwitchResponse, RequestError> {
        self.authorize(presented)?;

        let request =
            SwitchRequest::from_json(body).map_err(|e| RequestError::Malformed(e.to_string()))?;
        info!(
            to = %request.to,
            skip_optional = request.skip_optional,
            "switch requested over http"
        );

        match self
            .switcher
            .switch_to(request.to, request.skip_optional)
            .await
        {
            Ok(_) => Ok(SwitchResponse::ok()),
            Err(e) => Ok(SwitchResponse::switch_failed(e.to_string())),
        }
    }

    fn authorize(&self, presented: Option<&[u8]>) -> Result<(), RequestError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        match presented {
            Some(value) if secret.matches(value) => Ok(()),
            _ => {
                warn!("rejected switch request with a missing or wrong secret");
                Err(RequestError::Unauthorized)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
