use serde::{Deserialize, Serialize};

use super::mail::{GraphItemBody, GraphRecipient};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GraphEventList {
    #[serde(default)]
    pub value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink", default, skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    pub id: String,
    pub subject: Option<String>,
    pub body_preview: Option<String>,
    pub body: Option<GraphItemBody>,
    #[serde(default)]
    pub start: GraphDateTimeZone,
    #[serde(default)]
    pub end: GraphDateTimeZone,
    #[serde(default)]
    pub attendees: Vec<GraphRecipient>,
    pub location: Option<GraphLocation>,
    pub is_cancelled: Option<bool>,
}

/// Graph returns local wall-clock time plus a zone name, e.g.
/// `{"dateTime": "2025-01-01T10:00:00.0000000", "timeZone": "UTC"}`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphDateTimeZone {
    #[serde(default)]
    pub date_time: String,
    #[serde(default)]
    pub time_zone: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphLocation {
    pub display_name: Option<String>,
}
