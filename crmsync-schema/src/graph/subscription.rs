use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /subscriptions` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubscriptionCreate {
    pub change_type: String,
    pub notification_url: String,
    pub resource: String,
    pub expiration_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_state: Option<String>,
}

/// `PATCH /subscriptions/{id}` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubscriptionPatch {
    pub expiration_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSubscription {
    pub id: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub change_type: Option<String>,
    pub expiration_date_time: DateTime<Utc>,
    #[serde(default)]
    pub client_state: Option<String>,
}

/// Change-notification delivery: `{"value": [...]}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphNotificationBatch {
    pub value: Vec<GraphNotification>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNotification {
    pub subscription_id: String,
    pub change_type: String,
    pub resource: String,
    #[serde(default)]
    pub client_state: Option<String>,
    #[serde(default)]
    pub subscription_expiration_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_graph_notification_batch() {
        let raw = r#"{"value":[{
            "subscriptionId":"sub-1",
            "subscriptionExpirationDateTime":"2025-01-03T18:23:45.9356913Z",
            "changeType":"created",
            "resource":"Users/u1/Messages/m1",
            "clientState":"secret",
            "tenantId":"t1"
        }]}"#;
        let batch: GraphNotificationBatch = serde_json::from_str(raw).unwrap();
        assert_eq!(batch.value.len(), 1);
        let n = &batch.value[0];
        assert_eq!(n.subscription_id, "sub-1");
        assert_eq!(n.client_state.as_deref(), Some("secret"));
        assert!(n.subscription_expiration_date_time.is_some());
    }
}
