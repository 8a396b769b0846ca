use super::WebhookAck;
use crate::error::SyncError;
use crate::idempotency::OUTLOOK_WEBHOOK_EVENT;
use crate::server::router::AppState;
use crate::utils::logging::with_pretty_json_debug;
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use crmsync_schema::{GraphNotification, GraphNotificationBatch};
use serde::Deserialize;
use std::collections::HashSet;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationQuery {
    pub validation_token: Option<String>,
}

/// POST /api/webhooks/outlook
///
/// Graph subscription handshake (`validationToken` echoed as text/plain) or a
/// change-notification batch, acknowledged with 202.
pub async fn outlook_webhook(
    State(state): State<AppState>,
    Query(query): Query<ValidationQuery>,
    body: Bytes,
) -> Result<Response, SyncError> {
    if let Some(token) = query.validation_token {
        info!("graph subscription validation handshake");
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            token,
        )
            .into_response());
    }

    let batch: GraphNotificationBatch = serde_json::from_slice(&body)
        .map_err(|e| SyncError::BadRequest(format!("invalid notification batch: {e}")))?;

    with_pretty_json_debug(&batch, |pretty| {
        debug!(body = %pretty, "graph notification batch");
    });

    let expected_state = state
        .providers
        .outlook_cfg
        .as_ref()
        .and_then(|cfg| cfg.client_state.clone());

    let mut triggered = HashSet::new();
    for notification in batch.value {
        let key = idempotency_key(&notification);
        if state
            .idempotency
            .is_event_processed(OUTLOOK_WEBHOOK_EVENT, &key)
            .await
        {
            info!(%key, "duplicate notification ignored");
            continue;
        }

        let Some(connection) = state
            .db
            .find_active_connection_by_subscription(&notification.subscription_id)
            .await?
        else {
            warn!(
                subscription_id = %notification.subscription_id,
                "notification for unknown subscription skipped"
            );
            continue;
        };

        if !client_state_matches(expected_state.as_deref(), notification.client_state.as_deref()) {
            warn!(
                connection_id = connection.id,
                subscription_id = %notification.subscription_id,
                "clientState mismatch, notification skipped"
            );
            continue;
        }

        state
            .idempotency
            .mark_event_processed(
                OUTLOOK_WEBHOOK_EVENT,
                &key,
                Some(serde_json::json!({
                    "subscriptionId": notification.subscription_id,
                    "resource": notification.resource,
                    "changeType": notification.change_type,
                })),
            )
            .await;

        if triggered.insert(connection.id) {
            info!(
                connection_id = connection.id,
                change_type = %notification.change_type,
                "graph notification accepted, syncing"
            );
            state.sync.trigger_email_sync(connection);
        }
    }

    Ok((StatusCode::ACCEPTED, Json(WebhookAck::ok())).into_response())
}

fn idempotency_key(n: &GraphNotification) -> String {
    format!(
        "outlook-webhook-{}-{}-{}",
        n.subscription_id, n.resource, n.change_type
    )
}

/// With no configured client state every notification is accepted.
fn client_state_matches(expected: Option<&str>, received: Option<&str>) -> bool {
    match (expected, received) {
        (None, _) => true,
        (Some(expected), Some(received)) => expected.as_bytes().ct_eq(received.as_bytes()).into(),
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_subscription_resource_and_change() {
        let n: GraphNotification = serde_json::from_value(serde_json::json!({
            "subscriptionId": "sub-1",
            "changeType": "created",
            "resource": "Users/u/Messages/m"
        }))
        .unwrap();
        assert_eq!(
            idempotency_key(&n),
            "outlook-webhook-sub-1-Users/u/Messages/m-created"
        );
    }

    #[test]
    fn client_state_check() {
        assert!(client_state_matches(None, None));
        assert!(client_state_matches(None, Some("x")));
        assert!(client_state_matches(Some("s3cret"), Some("s3cret")));
        assert!(!client_state_matches(Some("s3cret"), Some("other")));
        assert!(!client_state_matches(Some("s3cret"), None));
    }
}
