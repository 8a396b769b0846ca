use base64::Engine as _;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{DateTime, NaiveTime, Utc};
use crmsync_schema::{GmailMessage, GoogleEvent, GoogleEventDateTime};

use super::parse_epoch_millis;
use crate::providers::records::{CalendarEventRecord, EmailRecord, split_address_list};

pub(super) fn email_record(message: GmailMessage) -> EmailRecord {
    let subject = message.header("Subject").unwrap_or_default().to_string();
    let from = message.header("From").unwrap_or_default().to_string();
    let to = message
        .header("To")
        .map(split_address_list)
        .unwrap_or_default();

    let date = message
        .internal_date
        .as_deref()
        .and_then(parse_epoch_millis)
        .or_else(|| {
            message
                .header("Date")
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);

    let body = message
        .body_data("text/plain")
        .and_then(decode_body)
        .or_else(|| message.snippet.clone());
    let html_body = message.body_data("text/html").and_then(decode_body);

    EmailRecord {
        thread_id: Some(message.thread_id.clone()).filter(|t| !t.is_empty()),
        is_read: Some(!message.has_label("UNREAD")),
        message_id: message.id,
        subject,
        from,
        to,
        date,
        body,
        html_body,
        labels: message.label_ids,
    }
}

/// Gmail bodies are base64url; padding is present on some parts and absent on others.
fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

pub(super) fn calendar_record(event: GoogleEvent) -> Option<CalendarEventRecord> {
    let start = event_time(&event.start)?;
    let end = event_time(&event.end).unwrap_or(start);

    Some(CalendarEventRecord {
        id: event.id,
        summary: event.summary.unwrap_or_default(),
        description: event.description,
        start,
        end,
        attendees: event
            .attendees
            .into_iter()
            .map(|a| a.email)
            .filter(|e| !e.is_empty())
            .collect(),
        location: event.location,
    })
}

/// Timed events carry `dateTime`; all-day events only a `date`, taken as midnight UTC.
fn event_time(t: &GoogleEventDateTime) -> Option<DateTime<Utc>> {
    t.date_time
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| t.date.map(|d| d.and_time(NaiveTime::MIN).and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_and_unpadded_bodies() {
        assert_eq!(decode_body("aGk").as_deref(), Some("hi"));
        assert_eq!(decode_body("aGk=").as_deref(), Some("hi"));
        assert_eq!(decode_body("PGI-aGk8L2I-").as_deref(), Some("<b>hi</b>"));
    }

    #[test]
    fn all_day_events_start_at_midnight_utc() {
        let event: GoogleEvent = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "summary": "Offsite",
            "start": {"date": "2024-03-01"},
            "end": {"date": "2024-03-02"}
        }))
        .unwrap();
        let record = calendar_record(event).unwrap();
        assert_eq!(record.start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!((record.end - record.start).num_minutes(), 24 * 60);
    }
}
