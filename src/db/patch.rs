use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::SyncError;

/// Partial update of an `email_connections` row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionPatch {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub webhook_subscription_id: Option<String>,
    pub webhook_expiry: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ConnectionPatch {
    pub fn tokens(
        access_token: String,
        refresh_token: Option<String>,
        token_expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            token_expiry,
            ..Self::default()
        }
    }

    pub fn webhook(subscription_id: Option<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            webhook_subscription_id: subscription_id,
            webhook_expiry: Some(expiry),
            ..Self::default()
        }
    }

    pub fn synced_at(at: DateTime<Utc>) -> Self {
        Self {
            last_sync_at: Some(at),
            ..Self::default()
        }
    }

    pub(crate) async fn apply(&self, pool: &SqlitePool, id: i64) -> Result<(), SyncError> {
        let updated_at = Utc::now();

        let res = sqlx::query(
            r#"
            UPDATE email_connections
            SET
                access_token = COALESCE(?, access_token),
                refresh_token = COALESCE(?, refresh_token),
                token_expiry = COALESCE(?, token_expiry),
                scope = COALESCE(?, scope),
                webhook_subscription_id = COALESCE(?, webhook_subscription_id),
                webhook_expiry = COALESCE(?, webhook_expiry),
                is_active = COALESCE(?, is_active),
                last_sync_at = COALESCE(?, last_sync_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&self.access_token)
        .bind(&self.refresh_token)
        .bind(self.token_expiry)
        .bind(&self.scope)
        .bind(&self.webhook_subscription_id)
        .bind(self.webhook_expiry)
        .bind(self.is_active)
        .bind(self.last_sync_at)
        .bind(updated_at)
        .bind(id)
        .execute(pool)
        .await?;

        let affected = res.rows_affected();
        debug!(
            connection_id = id,
            affected,
            updated_at = %updated_at,
            access_token_set = self.access_token.is_some(),
            refresh_token_set = self.refresh_token.is_some(),
            webhook_set = self.webhook_subscription_id.is_some() || self.webhook_expiry.is_some(),
            is_active = ?self.is_active,
            "db patch applied"
        );

        if affected == 0 {
            return Err(SyncError::NotFound(format!(
                "email connection not found for id={id}"
            )));
        }
        Ok(())
    }
}
