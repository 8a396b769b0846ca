use super::WebhookAck;
use crate::db::ProviderKind;
use crate::error::SyncError;
use crate::idempotency::GMAIL_WEBHOOK_EVENT;
use crate::server::router::AppState;
use crate::utils::logging::with_pretty_json_debug;
use axum::{Json, body::Bytes, extract::State};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use crmsync_schema::{GmailNotification, PubSubEnvelope};
use tracing::{debug, info, warn};

/// POST /api/webhooks/gmail
///
/// Pub/Sub push delivery for a Gmail watch. Anything past envelope validation
/// answers 200 so Pub/Sub does not redeliver.
pub async fn gmail_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, SyncError> {
    let envelope: PubSubEnvelope = serde_json::from_slice(&body)
        .map_err(|e| SyncError::BadRequest(format!("invalid Pub/Sub envelope: {e}")))?;
    let notification = decode_notification(&envelope.message.data)?;

    with_pretty_json_debug(&notification, |pretty| {
        debug!(body = %pretty, "gmail notification payload");
    });

    let key = idempotency_key(&envelope, &notification);
    if state
        .idempotency
        .is_event_processed(GMAIL_WEBHOOK_EVENT, &key)
        .await
    {
        info!(%key, "duplicate notification ignored");
        return Ok(Json(WebhookAck::already_processed()));
    }

    let connections = state
        .db
        .list_active_connections_by_mailbox(ProviderKind::Gmail, &notification.email_address)
        .await?;

    state
        .idempotency
        .mark_event_processed(
            GMAIL_WEBHOOK_EVENT,
            &key,
            Some(serde_json::json!({
                "emailAddress": notification.email_address,
                "historyId": notification.history_id,
            })),
        )
        .await;

    if connections.is_empty() {
        warn!(
            email = %notification.email_address,
            "gmail notification for unknown mailbox"
        );
    }
    for connection in connections {
        info!(
            connection_id = connection.id,
            history_id = %notification.history_id,
            "gmail notification accepted, syncing"
        );
        state.sync.trigger_email_sync(connection);
    }

    Ok(Json(WebhookAck::ok()))
}

fn idempotency_key(envelope: &PubSubEnvelope, notification: &GmailNotification) -> String {
    let id = envelope
        .message
        .message_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(&notification.history_id);
    format!("gmail-webhook-{id}")
}

fn decode_notification(data: &str) -> Result<GmailNotification, SyncError> {
    let raw = STANDARD
        .decode(data.trim())
        .or_else(|_| URL_SAFE.decode(data.trim()))
        .map_err(|e| SyncError::BadRequest(format!("message.data is not base64: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| SyncError::BadRequest(format!("message.data is not a Gmail notification: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(data: &str, message_id: Option<&str>) -> PubSubEnvelope {
        serde_json::from_value(serde_json::json!({
            "message": { "data": data, "messageId": message_id }
        }))
        .unwrap()
    }

    #[test]
    fn key_prefers_pubsub_message_id() {
        let n = GmailNotification {
            email_address: "a@b.com".to_string(),
            history_id: "77".to_string(),
        };
        assert_eq!(idempotency_key(&envelope("", Some("m-1")), &n), "gmail-webhook-m-1");
        assert_eq!(idempotency_key(&envelope("", None), &n), "gmail-webhook-77");
    }

    #[test]
    fn decodes_standard_and_url_safe_base64() {
        let json = br#"{"emailAddress":"rep@acme.io","historyId":"123"}"#;
        let std = STANDARD.encode(json);
        let url = URL_SAFE.encode(json);
        assert_eq!(decode_notification(&std).unwrap().history_id, "123");
        assert_eq!(decode_notification(&url).unwrap().email_address, "rep@acme.io");
        assert!(matches!(
            decode_notification("not base64!!"),
            Err(SyncError::BadRequest(_))
        ));
    }
}
