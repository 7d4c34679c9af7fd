//! HTTP surface for the control endpoint.
//!
//! One route, `POST /switch`.  The body is read as JSON whatever the
//! `Content-Type` says and the shared secret travels in the `X-Secret`
//! header.
//!
//! | Outcome                         | Status | Body                               |
//! |---------------------------------|--------|------------------------------------|
//! | switch ran (or failed inside)   | 200    | `{"success": true, "error": ..}`   |
//! | body not a valid request        | 400    | `{"success": false, "error": ..}`  |
//! | secret missing or wrong         | 403    | `{"success": false, "error": ..}`  |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use kvm_switch_core::SwitchResponse;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::application::control_endpoint::{ControlEndpoint, RequestError, SECRET_HEADER};

/// Builds the router.  Exposed separately from [`serve`] so tests can drive
/// it in-process.
pub fn router(endpoint: Arc<ControlEndpoint>) -> Router {
    Router::new()
        .route("/switch", post(switch))
        .with_state(endpoint)
}

async fn switch(
    State(endpoint): State<Arc<ControlEndpoint>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<SwitchResponse>) {
    let presented = headers.get(SECRET_HEADER).map(|value| value.as_bytes());
    match endpoint.handle(presented, &body).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => (status_for(&e), Json(SwitchResponse::rejected(e.to_string()))),
    }
}

fn status_for(error: &RequestError) -> StatusCode {
    match error {
        RequestError::Unauthorized => StatusCode::FORBIDDEN,
        RequestError::Malformed(_) => StatusCode::BAD_REQUEST,
    }
}

/// Serves the router on `bind` until `shutdown` turns `true`.
///
/// # Errors
///
/// Returns the I/O error if the address cannot be bound or the accept loop
/// fails.
pub async fn serve(
    bind: SocketAddr,
    endpoint: Arc<ControlEndpoint>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(
        authenticated = endpoint.requires_secret(),
        "control endpoint listening on http://{}",
        listener.local_addr()?
    );
    axum::serve(listener, router(endpoint))
        .with_graceful_shutdown(async move {
            // A dropped sender also means shut down.
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!("control endpoint stopped");
    Ok(())
}
