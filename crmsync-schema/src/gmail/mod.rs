mod message;
mod pubsub;
mod watch;

pub use message::{
    GmailHeader, GmailMessage, GmailMessageBody, GmailMessageList, GmailMessagePart,
    GmailMessageRef, GmailProfile,
};
pub use pubsub::{GmailNotification, PubSubEnvelope, PubSubMessage};
pub use watch::{GmailWatchRequest, GmailWatchResponse};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Google APIs encode int64 values as JSON strings, but Pub/Sub payloads built by Gmail
/// carry `historyId` as a bare number. Accept both.
pub(crate) fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

pub(crate) fn deserialize_opt_string_lax<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;

    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom("expected a string or a number")),
    }
}
