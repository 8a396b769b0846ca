use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::crm::{ActivityMaterializer, Materialized};
use crate::db::{ConnectionPatch, DbActorHandle, DbEmailConnection, ProviderKind};
use crate::error::SyncError;
use crate::idempotency::{EMAIL_MESSAGE_EVENT, IdempotencyGuard};
use crate::providers::{EmailRecord, Providers};

const SENT_LABEL: &str = "SENT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub fetched: usize,
    pub created: usize,
    pub skipped: usize,
}

/// Pulls mail and calendar data for one connection and materializes activities.
#[derive(Clone)]
pub struct SyncService {
    db: DbActorHandle,
    providers: Providers,
    materializer: ActivityMaterializer,
    idempotency: IdempotencyGuard,
}

impl SyncService {
    pub fn new(db: DbActorHandle, providers: Providers) -> Self {
        Self {
            materializer: ActivityMaterializer::new(db.clone()),
            idempotency: IdempotencyGuard::new(db.clone()),
            db,
            providers,
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn idempotency(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    async fn load_active(&self, connection_id: i64) -> Result<DbEmailConnection, SyncError> {
        let connection = self
            .db
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("connection {connection_id} not found")))?;
        if !connection.is_active {
            return Err(SyncError::BadRequest(format!(
                "connection {connection_id} is inactive"
            )));
        }
        Ok(connection)
    }

    pub async fn sync_emails(&self, connection_id: i64) -> Result<SyncSummary, SyncError> {
        let connection = self.load_active(connection_id).await?;
        self.sync_connection_emails(connection).await
    }

    pub async fn sync_calendar(&self, connection_id: i64) -> Result<SyncSummary, SyncError> {
        let connection = self.load_active(connection_id).await?;
        self.sync_connection_calendar(connection).await
    }

    pub async fn sync_connection_emails(
        &self,
        connection: DbEmailConnection,
    ) -> Result<SyncSummary, SyncError> {
        if !self.providers.settings.enable_email_sync {
            return Err(SyncError::BadRequest("email sync is disabled".to_string()));
        }

        let connection = self.providers.ensure_fresh_token(&self.db, connection).await?;
        let adapter = self.providers.adapter_for(&connection)?;
        let emails = adapter
            .fetch_emails(self.providers.settings.email_fetch_limit)
            .await?;

        let mut summary = SyncSummary {
            fetched: emails.len(),
            ..SyncSummary::default()
        };

        for email in &emails {
            let key = email_event_key(connection.provider, &email.message_id);
            if self.idempotency.is_event_processed(EMAIL_MESSAGE_EVENT, &key).await {
                summary.skipped += 1;
                continue;
            }

            let is_inbound = !is_outbound(email, &connection);
            match self
                .materializer
                .create_activity_from_email(email, connection.provider, &connection.user_id, is_inbound)
                .await?
            {
                Some(outcome) => {
                    if outcome.is_created() {
                        summary.created += 1;
                    } else {
                        summary.skipped += 1;
                    }
                    let metadata = json!({
                        "connectionId": connection.id,
                        "activityId": outcome.activity_id(),
                    });
                    self.idempotency
                        .mark_event_processed(EMAIL_MESSAGE_EVENT, &key, Some(metadata))
                        .await;
                }
                // Left unrecorded so a Contact or Lead created later can still match.
                None => summary.skipped += 1,
            }
        }

        self.touch_last_sync(connection.id).await?;
        info!(
            connection_id = connection.id,
            provider = %connection.provider,
            fetched = summary.fetched,
            created = summary.created,
            skipped = summary.skipped,
            "email sync finished"
        );
        Ok(summary)
    }

    pub async fn sync_connection_calendar(
        &self,
        connection: DbEmailConnection,
    ) -> Result<SyncSummary, SyncError> {
        if !self.providers.settings.enable_email_sync {
            return Err(SyncError::BadRequest("calendar sync is disabled".to_string()));
        }

        let connection = self.providers.ensure_fresh_token(&self.db, connection).await?;
        let adapter = self.providers.adapter_for(&connection)?;
        let events = adapter
            .fetch_calendar_events(self.providers.settings.calendar_fetch_limit)
            .await?;

        let mut summary = SyncSummary {
            fetched: events.len(),
            ..SyncSummary::default()
        };
        for event in &events {
            match self
                .materializer
                .create_activity_from_calendar_event(event, connection.provider, &connection.user_id)
                .await?
            {
                Some(Materialized::Created(_)) => summary.created += 1,
                Some(Materialized::Existing(_)) | None => summary.skipped += 1,
            }
        }

        self.touch_last_sync(connection.id).await?;
        info!(
            connection_id = connection.id,
            provider = %connection.provider,
            fetched = summary.fetched,
            created = summary.created,
            skipped = summary.skipped,
            "calendar sync finished"
        );
        Ok(summary)
    }

    /// Detached email sync, used as the webhook wake-up. Failures are logged only.
    pub fn trigger_email_sync(&self, connection: DbEmailConnection) {
        if !self.providers.settings.enable_email_sync {
            debug!(connection_id = connection.id, "email sync disabled, webhook not acted on");
            return;
        }

        let service = self.clone();
        tokio::spawn(async move {
            let connection_id = connection.id;
            let provider = connection.provider;
            if let Err(e) = service.sync_connection_emails(connection).await {
                if e.is_storage_unavailable() {
                    error!(connection_id, %provider, error = %e, "triggered email sync failed");
                } else {
                    warn!(connection_id, %provider, error = %e, "triggered email sync failed");
                }
            }
        });
    }

    async fn touch_last_sync(&self, connection_id: i64) -> Result<(), SyncError> {
        self.db
            .patch_connection(connection_id, ConnectionPatch::synced_at(Utc::now()))
            .await
    }
}

pub(crate) fn email_event_key(provider: ProviderKind, message_id: &str) -> String {
    format!("{provider}-{message_id}")
}

/// Gmail marks sent mail with the `SENT` label; otherwise compare the sender to the mailbox.
fn is_outbound(email: &EmailRecord, connection: &DbEmailConnection) -> bool {
    email.has_label(SENT_LABEL)
        || email
            .from_address()
            .is_some_and(|from| from.eq_ignore_ascii_case(&connection.email_address))
}
