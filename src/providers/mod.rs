//! Upstream mail/calendar providers behind one capability trait.

pub mod bootstrap;
pub mod gmail;
pub(crate) mod http;
pub mod oauth;
pub mod outlook;
pub mod records;
pub mod token;
pub mod upstream_retry;

use async_trait::async_trait;

use crate::db::ProviderKind;
use crate::error::SyncError;

pub use bootstrap::Providers;
pub use gmail::GmailSync;
pub use outlook::OutlookSync;
pub use records::{CalendarEventRecord, EmailRecord};
pub use upstream_retry::RetryPolicy;

pub(crate) const UPSTREAM_BODY_PREVIEW_CHARS: usize = 500;

/// Uniform fetch surface over Gmail and Outlook. Every call is retried per
/// the configured [`RetryPolicy`]; an error here means retries were exhausted
/// or the failure was not retryable.
#[async_trait]
pub trait MailProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Most recent messages, newest first, at most `max_results`.
    async fn fetch_emails(&self, max_results: usize) -> Result<Vec<EmailRecord>, SyncError>;

    /// Events that started within the configured lookback window, at most `max_results`.
    async fn fetch_calendar_events(
        &self,
        max_results: usize,
    ) -> Result<Vec<CalendarEventRecord>, SyncError>;
}
