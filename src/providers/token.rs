use chrono::Utc;
use tracing::{debug, info, warn};

use super::bootstrap::Providers;
use crate::db::{ConnectionPatch, DbActorHandle, DbEmailConnection};
use crate::error::SyncError;

/// Refresh when the access token has less than this left.
pub const TOKEN_REFRESH_SKEW_MINUTES: i64 = 5;

impl Providers {
    /// Returns `connection` with a usable access token, refreshing and persisting
    /// a new one when the current token is expired or about to expire.
    ///
    /// Connections without a refresh token are returned unchanged.
    pub async fn ensure_fresh_token(
        &self,
        db: &DbActorHandle,
        connection: DbEmailConnection,
    ) -> Result<DbEmailConnection, SyncError> {
        let skew = chrono::Duration::minutes(TOKEN_REFRESH_SKEW_MINUTES);
        if !connection.token_expires_within(Utc::now(), skew) {
            return Ok(connection);
        }
        let Some(refresh_token) = connection.refresh_token.clone() else {
            debug!(
                connection_id = connection.id,
                provider = %connection.provider,
                "access token expiring but no refresh token stored"
            );
            return Ok(connection);
        };

        self.refresh_connection(db, connection, &refresh_token).await
    }

    async fn refresh_connection(
        &self,
        db: &DbActorHandle,
        mut connection: DbEmailConnection,
        refresh_token: &str,
    ) -> Result<DbEmailConnection, SyncError> {
        let issued = match self.oauth.refresh(connection.provider, refresh_token).await {
            Ok(issued) => issued,
            Err(SyncError::Oauth(e)) if e.requires_reconnect() => {
                warn!(
                    connection_id = connection.id,
                    provider = %connection.provider,
                    user_id = %connection.user_id,
                    error = %e,
                    "refresh token rejected, mailbox must be reconnected"
                );
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let patch = ConnectionPatch::tokens(
            issued.access_token.clone(),
            issued.refresh_token.clone(),
            issued.expires_at,
        );
        db.patch_connection(connection.id, patch).await?;

        info!(
            connection_id = connection.id,
            provider = %connection.provider,
            expires_at = ?issued.expires_at,
            refresh_token_rotated = issued.refresh_token.is_some(),
            "access token refreshed"
        );

        connection.access_token = issued.access_token;
        if let Some(rotated) = issued.refresh_token {
            connection.refresh_token = Some(rotated);
        }
        if issued.expires_at.is_some() {
            connection.token_expiry = issued.expires_at;
        }
        Ok(connection)
    }
}
