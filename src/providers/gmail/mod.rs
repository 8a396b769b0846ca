//! Gmail + Google Calendar adapter.

mod convert;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use crmsync_schema::{
    GmailMessage, GmailMessageList, GmailProfile, GmailWatchRequest, GmailWatchResponse,
    GoogleEventList,
};
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use super::http::ProviderHttp;
use super::records::{CalendarEventRecord, EmailRecord};
use super::MailProvider;
use crate::db::ProviderKind;
use crate::error::SyncError;

/// Gmail watches last about a week; used when the response carries no usable expiration.
pub const GMAIL_WATCH_LIFETIME_DAYS: i64 = 7;

/// Inbox + sent query used for the email fetch.
const MAILBOX_QUERY: &str = "in:inbox OR in:sent";

pub struct GmailSync {
    gmail: ProviderHttp,
    calendar: ProviderHttp,
    calendar_lookback: ChronoDuration,
}

impl GmailSync {
    pub(crate) fn new(
        gmail: ProviderHttp,
        calendar: ProviderHttp,
        calendar_lookback: ChronoDuration,
    ) -> Self {
        Self {
            gmail,
            calendar,
            calendar_lookback,
        }
    }

    /// `users/me/profile`: resolves the mailbox address of the token owner.
    pub async fn profile(&self) -> Result<GmailProfile, SyncError> {
        self.gmail
            .get_json("gmail.profile", "users/me/profile", &[], HeaderMap::new())
            .await
    }

    /// Registers (or re-registers) push notifications for the INBOX label and
    /// returns when the watch lapses.
    pub async fn watch_inbox(&self, topic_name: &str) -> Result<GmailWatch, SyncError> {
        let resp: GmailWatchResponse = self
            .gmail
            .send_json(
                "gmail.watch",
                Method::POST,
                "users/me/watch",
                &GmailWatchRequest::inbox(topic_name),
            )
            .await?;

        let expires_at = parse_epoch_millis(&resp.expiration).unwrap_or_else(|| {
            warn!(expiration = %resp.expiration, "unparseable gmail watch expiration, assuming 7 days");
            Utc::now() + ChronoDuration::days(GMAIL_WATCH_LIFETIME_DAYS)
        });

        Ok(GmailWatch {
            history_id: resp.history_id,
            expires_at,
        })
    }

    /// Stops all push notifications for the mailbox.
    pub async fn stop(&self) -> Result<(), SyncError> {
        self.gmail
            .send_empty("gmail.stop", Method::POST, "users/me/stop")
            .await
    }

    async fn get_message(&self, id: &str) -> Result<GmailMessage, SyncError> {
        self.gmail
            .get_json(
                "gmail.messages.get",
                &format!("users/me/messages/{id}"),
                &[("format", "full".to_string())],
                HeaderMap::new(),
            )
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GmailWatch {
    pub history_id: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
impl MailProvider for GmailSync {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gmail
    }

    async fn fetch_emails(&self, max_results: usize) -> Result<Vec<EmailRecord>, SyncError> {
        let list: GmailMessageList = self
            .gmail
            .get_json(
                "gmail.messages.list",
                "users/me/messages",
                &[
                    ("maxResults", max_results.to_string()),
                    ("q", MAILBOX_QUERY.to_string()),
                ],
                HeaderMap::new(),
            )
            .await?;

        let mut records = Vec::with_capacity(list.messages.len());
        for message_ref in list.messages.iter().take(max_results) {
            let message = self.get_message(&message_ref.id).await?;
            records.push(convert::email_record(message));
        }
        debug!(count = records.len(), "gmail messages fetched");
        Ok(records)
    }

    async fn fetch_calendar_events(
        &self,
        max_results: usize,
    ) -> Result<Vec<CalendarEventRecord>, SyncError> {
        let time_min = Utc::now() - self.calendar_lookback;
        let list: GoogleEventList = self
            .calendar
            .get_json(
                "calendar.events.list",
                "calendars/primary/events",
                &[
                    ("timeMin", time_min.to_rfc3339()),
                    ("maxResults", max_results.to_string()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ],
                HeaderMap::new(),
            )
            .await?;

        let records: Vec<_> = list
            .items
            .into_iter()
            .filter(|e| e.status.as_deref() != Some("cancelled"))
            .filter_map(convert::calendar_record)
            .take(max_results)
            .collect();
        debug!(count = records.len(), "google calendar events fetched");
        Ok(records)
    }
}

pub(crate) fn parse_epoch_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
