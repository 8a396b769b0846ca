use crate::db::ProviderKind;
use crate::error::SyncError;
use crate::server::guards::RequireKeyAuth;
use crate::server::router::AppState;
use axum::{body::Bytes, extract::State};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewRequest {
    provider: String,
    connection_id: i64,
}

/// POST /api/webhooks/renew
///
/// Single-connection renewal is served by the scheduled job and the
/// `webhookRenewal.renewAll` procedure; this endpoint only validates its input.
pub async fn renew_webhook(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(), SyncError> {
    let req: RenewRequest = serde_json::from_slice(&body)
        .map_err(|e| SyncError::BadRequest(format!("invalid renew request: {e}")))?;

    let provider: ProviderKind = req
        .provider
        .parse()
        .map_err(|_| SyncError::BadRequest(format!("invalid provider: {}", req.provider)))?;

    let connection = state
        .db
        .get_connection(req.connection_id)
        .await?
        .filter(|c| c.provider == provider)
        .ok_or_else(|| SyncError::NotFound(format!("connection {} not found", req.connection_id)))?;

    info!(connection_id = connection.id, %provider, "manual renewal requested");
    Err(SyncError::NotImplemented(format!(
        "manual {provider} renewal is not implemented"
    )))
}
