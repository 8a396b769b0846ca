//! Provider-neutral shapes the adapters hand to the sync core.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    /// Raw `From` value, possibly `Name <addr>`.
    pub from: String,
    /// Raw recipient values in header order.
    pub to: Vec<String>,
    pub date: DateTime<Utc>,
    pub body: Option<String>,
    pub html_body: Option<String>,
    /// Gmail label ids; empty for Outlook.
    pub labels: Vec<String>,
    pub is_read: Option<bool>,
}

impl EmailRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn from_address(&self) -> Option<&str> {
        extract_address(&self.from)
    }

    pub fn first_recipient_address(&self) -> Option<&str> {
        self.to.iter().find_map(|r| extract_address(r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventRecord {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Attendee email addresses.
    pub attendees: Vec<String>,
    pub location: Option<String>,
}

/// Bare address out of `Display Name <user@host>` or `user@host`.
pub fn extract_address(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let addr = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => &raw[open + 1..close],
        _ => raw,
    };
    let addr = addr.trim().trim_matches('"');
    (!addr.is_empty() && addr.contains('@')).then_some(addr)
}

/// Split an address-list header on commas that are outside quotes and angle brackets.
pub fn split_address_list(header: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;

    for ch in header.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                push_trimmed(&mut out, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}
