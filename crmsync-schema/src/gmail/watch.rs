use serde::{Deserialize, Serialize};

use super::deserialize_string_lax;

/// `POST users/me/watch` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailWatchRequest {
    pub topic_name: String,
    pub label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_filter_behavior: Option<String>,
}

impl GmailWatchRequest {
    pub fn inbox(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            label_ids: vec!["INBOX".to_string()],
            label_filter_behavior: Some("include".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailWatchResponse {
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub history_id: String,
    /// Epoch milliseconds, string-encoded.
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub expiration: String,
}
