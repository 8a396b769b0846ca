use serde::{Deserialize, Serialize};

use super::deserialize_string_lax;

/// Pub/Sub push delivery envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// base64 of a JSON [`GmailNotification`].
    pub data: String,
    /// Pub/Sub sends both spellings on push deliveries.
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
}

/// Decoded `message.data` of a Gmail watch notification.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GmailNotification {
    pub email_address: String,
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub history_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_history_id_and_snake_case_message_id() {
        let n: GmailNotification =
            serde_json::from_str(r#"{"emailAddress":"a@b.com","historyId":9876}"#).unwrap();
        assert_eq!(n.history_id, "9876");

        let env: PubSubEnvelope =
            serde_json::from_str(r#"{"message":{"data":"e30=","message_id":"42"}}"#).unwrap();
        assert_eq!(env.message.message_id.as_deref(), Some("42"));
    }
}
