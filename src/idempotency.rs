//! At-most-once processing of provider events over an at-least-once delivery channel.
//!
//! The guard trades strict dedup for availability: when storage cannot be read the
//! event is treated as unseen, so an outage may let a duplicate through but never
//! drops a legitimate event.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::db::DbActorHandle;
use crate::error::SyncError;

pub const GMAIL_WEBHOOK_EVENT: &str = "gmail_webhook";
pub const OUTLOOK_WEBHOOK_EVENT: &str = "outlook_webhook";
pub const EMAIL_MESSAGE_EVENT: &str = "email_message";

/// Result of recording an event key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded,
    /// (type, key) already existed; the event was processed before.
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdempotentOutcome<T> {
    /// `false` when the event had been seen and the handler did not run.
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    db: DbActorHandle,
}

impl IdempotencyGuard {
    pub fn new(db: DbActorHandle) -> Self {
        Self { db }
    }

    /// Fails open: a storage error is logged and reported as "not processed".
    pub async fn is_event_processed(&self, event_type: &str, event_key: &str) -> bool {
        match self.db.processed_event_exists(event_type, event_key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    event_type,
                    event_key,
                    error = %e,
                    "idempotency lookup failed, treating event as unprocessed"
                );
                false
            }
        }
    }

    /// Records (type, key). A duplicate key is not an error.
    pub async fn record_event(
        &self,
        event_type: &str,
        event_key: &str,
        metadata: Option<Value>,
    ) -> Result<MarkOutcome, SyncError> {
        let inserted = self
            .db
            .insert_processed_event(event_type, event_key, metadata)
            .await?;
        if inserted {
            Ok(MarkOutcome::Recorded)
        } else {
            debug!(event_type, event_key, "event already recorded");
            Ok(MarkOutcome::Duplicate)
        }
    }

    /// `true` when the event is now recorded, including when it already was.
    /// `false` only when storage rejected the write.
    pub async fn mark_event_processed(
        &self,
        event_type: &str,
        event_key: &str,
        metadata: Option<Value>,
    ) -> bool {
        match self.record_event(event_type, event_key, metadata).await {
            Ok(_) => true,
            Err(e) => {
                warn!(event_type, event_key, error = %e, "failed to record processed event");
                false
            }
        }
    }

    /// Runs `handler` unless (type, key) was already processed, then records it.
    /// A handler error is returned as-is and the event stays unrecorded.
    pub async fn process_idempotently<T, F, Fut>(
        &self,
        event_type: &str,
        event_key: &str,
        handler: F,
    ) -> Result<IdempotentOutcome<T>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        if self.is_event_processed(event_type, event_key).await {
            debug!(event_type, event_key, "event already processed, skipping handler");
            return Ok(IdempotentOutcome {
                processed: false,
                result: None,
            });
        }

        let result = handler().await?;
        self.mark_event_processed(event_type, event_key, None).await;

        Ok(IdempotentOutcome {
            processed: true,
            result: Some(result),
        })
    }

    /// Deletes ledger rows older than `retention`; returns the purged count.
    pub async fn cleanup_old_events(&self, retention: chrono::Duration) -> Result<u64, SyncError> {
        let cutoff = Utc::now() - retention;
        let purged = self.db.purge_processed_events(cutoff).await?;
        info!(purged, cutoff = %cutoff, "processed events cleaned up");
        Ok(purged)
    }
}
