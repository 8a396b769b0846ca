//! `POST /rpc/{procedure}`: the procedure surface consumed by the CRM front end.
//!
//! Every call runs as the gateway-authenticated [`CurrentUser`]; procedures that
//! take a `connectionId` check ownership before touching the connection.

use crate::db::{DbEmailConnection, ProviderKind};
use crate::error::SyncError;
use crate::server::guards::CurrentUser;
use crate::server::router::AppState;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionInput {
    connection_id: i64,
}

/// Connection as returned to its owner. Tokens never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub id: i64,
    pub provider: ProviderKind,
    pub email_address: String,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub webhook_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbEmailConnection> for ConnectionView {
    fn from(c: DbEmailConnection) -> Self {
        Self {
            id: c.id,
            provider: c.provider,
            email_address: c.email_address,
            is_active: c.is_active,
            last_sync_at: c.last_sync_at,
            webhook_expiry: c.webhook_expiry,
            created_at: c.created_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/rpc/{procedure}", post(rpc_handler))
}

pub async fn rpc_handler(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, SyncError> {
    let result = match procedure.as_str() {
        "email.connections" => {
            let connections: Vec<ConnectionView> = state
                .db
                .list_user_connections(&user.user_id)
                .await?
                .into_iter()
                .map(ConnectionView::from)
                .collect();
            serde_json::to_value(connections)?
        }
        "email.syncEmails" => {
            let input: ConnectionInput = parse_input(&body)?;
            owned_connection(&state, &user, input.connection_id).await?;
            serde_json::to_value(state.sync.sync_emails(input.connection_id).await?)?
        }
        "email.syncCalendar" => {
            let input: ConnectionInput = parse_input(&body)?;
            owned_connection(&state, &user, input.connection_id).await?;
            serde_json::to_value(state.sync.sync_calendar(input.connection_id).await?)?
        }
        "email.deleteConnection" => {
            let input: ConnectionInput = parse_input(&body)?;
            let connection = owned_connection(&state, &user, input.connection_id).await?;
            state.renewal.unregister_webhook(&connection).await;
            let deleted = state.db.delete_connection(connection.id).await?;
            info!(connection_id = connection.id, deleted, "connection deleted");
            json!({ "success": deleted })
        }
        "email.deactivateConnections" => {
            let count = state.db.deactivate_user_connections(&user.user_id).await?;
            json!({ "deactivated": count })
        }
        "webhookRenewal.renewAll" => serde_json::to_value(state.renewal.renew_all().await?)?,
        "webhookRenewal.getStatus" => {
            serde_json::to_value(state.renewal.status(&user.user_id).await?)?
        }
        other => {
            warn!(procedure = other, "unknown rpc procedure");
            return Err(SyncError::NotFound(format!("unknown procedure '{other}'")));
        }
    };

    Ok(Json(json!({ "result": result })))
}

fn parse_input<T: DeserializeOwned>(body: &Bytes) -> Result<T, SyncError> {
    if body.is_empty() {
        return Err(SyncError::Validation("request body is required".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| SyncError::Validation(e.to_string()))
}

async fn owned_connection(
    state: &AppState,
    user: &CurrentUser,
    connection_id: i64,
) -> Result<DbEmailConnection, SyncError> {
    let connection = state
        .db
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("connection {connection_id} not found")))?;

    if connection.user_id != user.user_id {
        return Err(SyncError::Forbidden(
            "connection belongs to another user".to_string(),
        ));
    }
    Ok(connection)
}
