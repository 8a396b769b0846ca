use chrono::{DateTime, NaiveDateTime, Utc};
use crmsync_schema::{GraphDateTimeZone, GraphEvent, GraphMessage, GraphRecipient};
use tracing::debug;

use crate::providers::records::{CalendarEventRecord, EmailRecord};

fn recipient_value(r: &GraphRecipient) -> Option<String> {
    let address = r.email_address.address.as_deref().filter(|a| !a.is_empty())?;
    Some(match r.email_address.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} <{address}>"),
        None => address.to_string(),
    })
}

pub(super) fn email_record(message: GraphMessage) -> EmailRecord {
    let (body, html_body) = match message.body {
        Some(b) if b.is_html() => (message.body_preview.clone(), Some(b.content)),
        Some(b) => (Some(b.content), None),
        None => (message.body_preview.clone(), None),
    };

    EmailRecord {
        message_id: message.id,
        thread_id: message.conversation_id,
        subject: message.subject.unwrap_or_default(),
        from: message
            .from
            .as_ref()
            .and_then(recipient_value)
            .unwrap_or_default(),
        to: message
            .to_recipients
            .iter()
            .filter_map(recipient_value)
            .collect(),
        date: message
            .received_date_time
            .or(message.sent_date_time)
            .unwrap_or_else(Utc::now),
        body,
        html_body,
        labels: Vec::new(),
        is_read: message.is_read,
    }
}

pub(super) fn calendar_record(event: GraphEvent) -> Option<CalendarEventRecord> {
    let start = graph_time(&event.start)?;
    let end = graph_time(&event.end).unwrap_or(start);

    let description = event
        .body_preview
        .filter(|p| !p.is_empty())
        .or_else(|| event.body.map(|b| b.content));

    Some(CalendarEventRecord {
        id: event.id,
        summary: event.subject.unwrap_or_default(),
        description,
        start,
        end,
        attendees: event
            .attendees
            .into_iter()
            .filter_map(|a| a.email_address.address)
            .filter(|a| !a.is_empty())
            .collect(),
        location: event
            .location
            .and_then(|l| l.display_name)
            .filter(|l| !l.is_empty()),
    })
}

/// Graph returns local wall-clock time plus a zone name; events are requested with
/// `Prefer: outlook.timezone="UTC"` so the wall clock is UTC.
fn graph_time(t: &GraphDateTimeZone) -> Option<DateTime<Utc>> {
    if !t.time_zone.is_empty() && !t.time_zone.eq_ignore_ascii_case("UTC") {
        debug!(time_zone = %t.time_zone, "graph event not in UTC, reading wall clock as UTC");
    }
    NaiveDateTime::parse_from_str(&t.date_time, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn html_body_keeps_preview_as_text() {
        let message: GraphMessage = serde_json::from_value(json!({
            "id": "AAMk1",
            "conversationId": "conv-1",
            "subject": "Quote",
            "from": {"emailAddress": {"address": "buyer@acme.io", "name": "Buyer"}},
            "toRecipients": [{"emailAddress": {"address": "me@corp.io"}}],
            "receivedDateTime": "2024-05-01T10:00:00Z",
            "body": {"contentType": "html", "content": "<p>Hi</p>"},
            "bodyPreview": "Hi",
            "isRead": false
        }))
        .unwrap();

        let record = email_record(message);
        assert_eq!(record.from, "Buyer <buyer@acme.io>");
        assert_eq!(record.to, vec!["me@corp.io"]);
        assert_eq!(record.body.as_deref(), Some("Hi"));
        assert_eq!(record.html_body.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(record.is_read, Some(false));
    }

    #[test]
    fn parses_graph_seven_digit_fractions() {
        let t = GraphDateTimeZone {
            date_time: "2024-05-01T10:30:00.0000000".to_string(),
            time_zone: "UTC".to_string(),
        };
        assert_eq!(
            graph_time(&t).map(|d| d.to_rfc3339()),
            Some("2024-05-01T10:30:00+00:00".to_string())
        );
    }
}
