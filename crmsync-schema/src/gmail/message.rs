use serde::{Deserialize, Serialize};

use super::deserialize_opt_string_lax;

/// `GET users/me/messages` page.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessageList {
    #[serde(default)]
    pub messages: Vec<GmailMessageRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// `GET users/me/messages/{id}?format=full`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    /// Epoch milliseconds, string-encoded.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub internal_date: Option<String>,
    pub payload: Option<GmailMessagePart>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessagePart {
    pub part_id: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<GmailHeader>,
    pub body: Option<GmailMessageBody>,
    #[serde(default)]
    pub parts: Vec<GmailMessagePart>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessageBody {
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
    /// base64url-encoded content.
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GmailHeader {
    pub name: String,
    pub value: String,
}

/// `GET users/me/profile`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GmailProfile {
    pub email_address: String,
    pub messages_total: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub history_id: Option<String>,
}

impl GmailMessage {
    /// Header lookup on the top-level payload. Header names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }

    /// Raw (still base64url-encoded) body data of the first part with `mime_type`.
    pub fn body_data(&self, mime_type: &str) -> Option<&str> {
        self.payload.as_ref()?.find_data(mime_type)
    }
}

impl GmailMessagePart {
    fn find_data(&self, mime_type: &str) -> Option<&str> {
        if self.mime_type.eq_ignore_ascii_case(mime_type) {
            if let Some(data) = self.body.as_ref().and_then(|b| b.data.as_deref()) {
                return Some(data);
            }
        }
        self.parts.iter().find_map(|p| p.find_data(mime_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nested_parts_and_headers() {
        let raw = r#"{
            "id": "m1",
            "threadId": "t1",
            "labelIds": ["INBOX", "UNREAD"],
            "internalDate": "1700000000000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [{"name": "subject", "value": "Hello"}],
                "parts": [{
                    "mimeType": "multipart/alternative",
                    "parts": [
                        {"mimeType": "text/plain", "body": {"size": 2, "data": "aGk"}},
                        {"mimeType": "text/html", "body": {"size": 9, "data": "PGI-aGk8L2I-"}}
                    ]
                }]
            }
        }"#;
        let msg: GmailMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.header("Subject"), Some("Hello"));
        assert_eq!(msg.body_data("text/plain"), Some("aGk"));
        assert_eq!(msg.body_data("text/html"), Some("PGI-aGk8L2I-"));
        assert!(msg.has_label("UNREAD"));
        assert_eq!(msg.internal_date.as_deref(), Some("1700000000000"));
    }
}
