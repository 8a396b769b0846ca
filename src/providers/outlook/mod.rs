//! Outlook mail + calendar adapter over Microsoft Graph.

mod convert;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use crmsync_schema::{
    GraphEventList, GraphMessageList, GraphSubscription, GraphSubscriptionCreate,
    GraphSubscriptionPatch, GraphUser,
};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::MailProvider;
use super::http::ProviderHttp;
use super::records::{CalendarEventRecord, EmailRecord};
use crate::db::ProviderKind;
use crate::error::SyncError;

/// Graph caps message subscriptions at 4230 minutes; stay a little under.
pub const OUTLOOK_SUBSCRIPTION_LIFETIME_MINUTES: i64 = 4200;

/// Resource watched for new inbox mail.
pub const INBOX_RESOURCE: &str = "me/mailFolders('Inbox')/messages";

const MESSAGE_SELECT: &str = "id,conversationId,subject,from,toRecipients,receivedDateTime,\
     sentDateTime,body,bodyPreview,isRead,isDraft";

pub struct OutlookSync {
    graph: ProviderHttp,
    calendar_lookback: ChronoDuration,
}

impl OutlookSync {
    pub(crate) fn new(graph: ProviderHttp, calendar_lookback: ChronoDuration) -> Self {
        Self {
            graph,
            calendar_lookback,
        }
    }

    pub fn subscription_expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now + ChronoDuration::minutes(OUTLOOK_SUBSCRIPTION_LIFETIME_MINUTES)
    }

    /// `GET /me`.
    pub async fn me(&self) -> Result<GraphUser, SyncError> {
        self.graph
            .get_json("graph.me", "me", &[], HeaderMap::new())
            .await
    }

    /// Subscribe to new inbox messages.
    pub async fn create_subscription(
        &self,
        notification_url: &str,
        client_state: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<GraphSubscription, SyncError> {
        let body = GraphSubscriptionCreate {
            change_type: "created".to_string(),
            notification_url: notification_url.to_string(),
            resource: INBOX_RESOURCE.to_string(),
            expiration_date_time: expires_at,
            client_state: client_state.map(str::to_string),
        };
        self.graph
            .send_json("graph.subscriptions.create", Method::POST, "subscriptions", &body)
            .await
    }

    /// Extend an existing subscription.
    pub async fn renew_subscription(
        &self,
        subscription_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<GraphSubscription, SyncError> {
        let body = GraphSubscriptionPatch {
            expiration_date_time: expires_at,
        };
        self.graph
            .send_json(
                "graph.subscriptions.renew",
                Method::PATCH,
                &format!("subscriptions/{subscription_id}"),
                &body,
            )
            .await
    }

    pub async fn delete_subscription(&self, subscription_id: &str) -> Result<(), SyncError> {
        self.graph
            .send_empty(
                "graph.subscriptions.delete",
                Method::DELETE,
                &format!("subscriptions/{subscription_id}"),
            )
            .await
    }
}

#[async_trait]
impl MailProvider for OutlookSync {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Outlook
    }

    async fn fetch_emails(&self, max_results: usize) -> Result<Vec<EmailRecord>, SyncError> {
        let list: GraphMessageList = self
            .graph
            .get_json(
                "graph.messages.list",
                "me/mailFolders/inbox/messages",
                &[
                    ("$top", max_results.to_string()),
                    ("$orderby", "receivedDateTime desc".to_string()),
                    ("$select", MESSAGE_SELECT.to_string()),
                ],
                HeaderMap::new(),
            )
            .await?;

        let records: Vec<_> = list
            .value
            .into_iter()
            .filter(|m| m.is_draft != Some(true))
            .map(convert::email_record)
            .take(max_results)
            .collect();
        debug!(count = records.len(), "outlook messages fetched");
        Ok(records)
    }

    async fn fetch_calendar_events(
        &self,
        max_results: usize,
    ) -> Result<Vec<CalendarEventRecord>, SyncError> {
        let since = (Utc::now() - self.calendar_lookback).to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("outlook.timezone=\"UTC\""),
        );

        let list: GraphEventList = self
            .graph
            .get_json(
                "graph.events.list",
                "me/calendar/events",
                &[
                    ("$top", max_results.to_string()),
                    ("$filter", format!("start/dateTime ge '{since}'")),
                    ("$orderby", "start/dateTime desc".to_string()),
                ],
                headers,
            )
            .await?;

        let records: Vec<_> = list
            .value
            .into_iter()
            .filter(|e| e.is_cancelled != Some(true))
            .filter_map(convert::calendar_record)
            .take(max_results)
            .collect();
        debug!(count = records.len(), "outlook calendar events fetched");
        Ok(records)
    }
}
