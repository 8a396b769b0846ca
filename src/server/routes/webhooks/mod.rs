//! Provider push endpoints plus the manual renewal trigger.
//!
//! Push handlers check the idempotency key before any side effect and hand
//! the actual fetch to a detached sync, so providers get a fast 2xx.

mod gmail;
mod outlook;
mod renew;

use crate::server::router::AppState;
use axum::{Router, http::StatusCode, routing::post};
use serde::Serialize;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

pub use gmail::gmail_webhook;
pub use outlook::outlook_webhook;
pub use renew::renew_webhook;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl WebhookAck {
    pub(crate) fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub(crate) fn already_processed() -> Self {
        Self {
            success: true,
            message: Some("Already processed"),
        }
    }
}

pub fn router(timeout: Duration) -> Router<AppState> {
    Router::new()
        .route("/gmail", post(gmail_webhook))
        .route("/outlook", post(outlook_webhook))
        .route("/renew", post(renew_webhook))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
}
