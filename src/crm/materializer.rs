use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::matcher::{CrmMatch, CrmMatcher};
use crate::db::{ActivityCreate, DbActorHandle, ProviderKind};
use crate::error::SyncError;
use crate::providers::records::{CalendarEventRecord, EmailRecord, extract_address};

pub const EMAIL_ACTIVITY_TYPE: &str = "Email";
pub const MEETING_ACTIVITY_TYPE: &str = "Meeting";
pub const MAX_NOTES_CHARS: usize = 1000;

/// Result of materializing one email or event that matched a CRM record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    Created(i64),
    /// An activity for the same provider message or event already existed.
    Existing(i64),
}

impl Materialized {
    pub fn activity_id(self) -> i64 {
        match self {
            Materialized::Created(id) | Materialized::Existing(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, Materialized::Created(_))
    }
}

/// Turns fetched mail and calendar events into CRM activities.
///
/// Every path returns `Ok(None)` when no CRM record matches; that is the expected
/// outcome for most traffic, not an error.
#[derive(Clone)]
pub struct ActivityMaterializer {
    db: DbActorHandle,
    matcher: CrmMatcher,
}

impl ActivityMaterializer {
    pub fn new(db: DbActorHandle) -> Self {
        Self {
            matcher: CrmMatcher::new(db.clone()),
            db,
        }
    }

    pub fn matcher(&self) -> &CrmMatcher {
        &self.matcher
    }

    pub async fn create_activity_from_email(
        &self,
        email: &EmailRecord,
        provider: ProviderKind,
        user_id: &str,
        is_inbound: bool,
    ) -> Result<Option<Materialized>, SyncError> {
        let counterparty = if is_inbound {
            email.from_address()
        } else {
            email.first_recipient_address()
        };
        let Some(counterparty) = counterparty else {
            debug!(message_id = %email.message_id, is_inbound, "email has no counterparty address");
            return Ok(None);
        };

        let crm_match = self.matcher.match_email_to_crm(counterparty).await?;
        if !crm_match.is_match() {
            debug!(
                message_id = %email.message_id,
                %provider,
                counterparty,
                "no CRM match for email, skipping"
            );
            return Ok(None);
        }

        if let Some(existing) = self.db.find_email_activity(provider, &email.message_id).await? {
            debug!(message_id = %email.message_id, activity_id = existing, "email already materialized");
            return Ok(Some(Materialized::Existing(existing)));
        }

        let subject = if email.subject.trim().is_empty() {
            "(no subject)".to_string()
        } else {
            email.subject.clone()
        };

        let create = ActivityCreate {
            activity_type: EMAIL_ACTIVITY_TYPE.to_string(),
            subject,
            notes: email.body.as_deref().map(truncate_notes),
            activity_date: email.date,
            user_id: user_id.to_string(),
            email_message_id: Some(email.message_id.clone()),
            email_thread_id: email.thread_id.clone(),
            email_provider: Some(provider),
            email_from: Some(email.from.clone()),
            email_to: Some(email.to.join(", ")),
            email_body: email.body.clone(),
            email_html_body: email.html_body.clone(),
            is_inbound: Some(is_inbound),
            ..linked(crm_match)
        };

        let outcome = self
            .insert_or_existing(create, || self.db.find_email_activity(provider, &email.message_id))
            .await?;
        if !outcome.is_created() {
            return Ok(Some(outcome));
        }
        info!(
            activity_id = outcome.activity_id(),
            message_id = %email.message_id,
            %provider,
            user_id,
            is_inbound,
            "email activity created"
        );
        Ok(Some(outcome))
    }

    /// Links a calendar event to the first attendee that matches a CRM record.
    pub async fn create_activity_from_calendar_event(
        &self,
        event: &CalendarEventRecord,
        provider: ProviderKind,
        user_id: &str,
    ) -> Result<Option<Materialized>, SyncError> {
        let mut crm_match = CrmMatch::None;
        for attendee in &event.attendees {
            let Some(address) = extract_address(attendee) else {
                continue;
            };
            crm_match = self.matcher.match_email_to_crm(address).await?;
            if crm_match.is_match() {
                break;
            }
        }
        if !crm_match.is_match() {
            debug!(event_id = %event.id, %provider, "no CRM match among attendees, skipping");
            return Ok(None);
        }

        if let Some(existing) = self.db.find_event_activity(provider, &event.id).await? {
            debug!(event_id = %event.id, activity_id = existing, "event already materialized");
            return Ok(Some(Materialized::Existing(existing)));
        }

        let subject = if event.summary.trim().is_empty() {
            "(no title)".to_string()
        } else {
            event.summary.clone()
        };

        let create = ActivityCreate {
            activity_type: MEETING_ACTIVITY_TYPE.to_string(),
            subject,
            notes: event.description.as_deref().map(truncate_notes),
            activity_date: event.start,
            duration_minutes: Some(duration_minutes(event.start, event.end)),
            user_id: user_id.to_string(),
            email_provider: Some(provider),
            external_event_id: Some(event.id.clone()),
            location: event.location.clone(),
            ..linked(crm_match)
        };

        let outcome = self
            .insert_or_existing(create, || self.db.find_event_activity(provider, &event.id))
            .await?;
        if outcome.is_created() {
            info!(
                activity_id = outcome.activity_id(),
                event_id = %event.id,
                %provider,
                user_id,
                "meeting activity created"
            );
        }
        Ok(Some(outcome))
    }

    /// Insert, or when a concurrent writer won the unique index, return its row.
    async fn insert_or_existing<F, Fut>(
        &self,
        create: ActivityCreate,
        lookup: F,
    ) -> Result<Materialized, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<i64>, SyncError>>,
    {
        if let Some(id) = self.db.insert_activity(create).await? {
            return Ok(Materialized::Created(id));
        }
        lookup().await?.map(Materialized::Existing).ok_or_else(|| {
            SyncError::UnexpectedError("activity insert conflicted but no row found".to_string())
        })
    }
}

fn linked(crm_match: CrmMatch) -> ActivityCreate {
    ActivityCreate {
        contact_id: crm_match.contact_id(),
        lead_id: crm_match.lead_id(),
        account_id: crm_match.account_id(),
        activity_date: Utc::now(),
        ..ActivityCreate::default()
    }
}

/// First [`MAX_NOTES_CHARS`] characters of `text`.
pub fn truncate_notes(text: &str) -> String {
    match text.char_indices().nth(MAX_NOTES_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Whole minutes between `start` and `end`, rounded to nearest; never negative.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds().max(0);
    (millis + 30_000) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn duration_rounds_to_nearest_minute() {
        let start = Utc::now();
        assert_eq!(duration_minutes(start, start), 0);
        assert_eq!(duration_minutes(start, start + Duration::minutes(45)), 45);
        assert_eq!(duration_minutes(start, start + Duration::seconds(89)), 1);
        assert_eq!(duration_minutes(start, start + Duration::seconds(90)), 2);
        assert_eq!(duration_minutes(start, start - Duration::minutes(5)), 0);
    }

    #[test]
    fn notes_truncate_on_char_boundary() {
        let long = "é".repeat(MAX_NOTES_CHARS + 10);
        let truncated = truncate_notes(&long);
        assert_eq!(truncated.chars().count(), MAX_NOTES_CHARS);
        assert_eq!(truncate_notes("short"), "short");
    }
}
