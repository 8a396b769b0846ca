use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::report::{ProviderRenewalResult, RenewalReport, WebhookStatus};
use crate::db::{ConnectionPatch, DbActorHandle, DbEmailConnection, ProviderKind};
use crate::error::SyncError;
use crate::providers::{OutlookSync, Providers};

/// Gmail watches within this many days of expiry are re-issued.
pub const GMAIL_RENEWAL_THRESHOLD_DAYS: i64 = 2;
/// Graph subscriptions within this many days of expiry are extended.
pub const OUTLOOK_RENEWAL_THRESHOLD_DAYS: i64 = 1;

#[derive(Clone)]
pub struct RenewalService {
    db: DbActorHandle,
    providers: Providers,
}

impl RenewalService {
    pub fn new(db: DbActorHandle, providers: Providers) -> Self {
        Self { db, providers }
    }

    fn threshold(provider: ProviderKind) -> Duration {
        match provider {
            ProviderKind::Gmail => Duration::days(GMAIL_RENEWAL_THRESHOLD_DAYS),
            ProviderKind::Outlook => Duration::days(OUTLOOK_RENEWAL_THRESHOLD_DAYS),
        }
    }

    /// Renews every due connection of every enabled provider, sequentially.
    pub async fn renew_all(&self) -> Result<RenewalReport, SyncError> {
        if !self.providers.settings.enable_webhook_renewal {
            return Err(SyncError::BadRequest("webhook renewal is disabled".to_string()));
        }

        let report = RenewalReport {
            gmail: self.renew_provider(ProviderKind::Gmail).await?,
            outlook: self.renew_provider(ProviderKind::Outlook).await?,
        };

        info!(
            gmail_success = report.gmail.success,
            gmail_failed = report.gmail.failed,
            outlook_success = report.outlook.success,
            outlook_failed = report.outlook.failed,
            "webhook renewal finished"
        );
        Ok(report)
    }

    /// [`Self::renew_all`] bounded by a wall-clock deadline.
    pub async fn renew_all_within(
        &self,
        deadline: std::time::Duration,
    ) -> Result<RenewalReport, SyncError> {
        tokio::time::timeout(deadline, self.renew_all())
            .await
            .map_err(|_| SyncError::Timeout(deadline))?
    }

    /// Connections of `provider` whose webhook lapses within the provider's threshold.
    pub async fn due_connections(
        &self,
        provider: ProviderKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<DbEmailConnection>, SyncError> {
        let threshold = Self::threshold(provider);
        Ok(self
            .db
            .list_active_connections(Some(provider))
            .await?
            .into_iter()
            .filter(|c| c.needs_renewal(now, threshold))
            .collect())
    }

    async fn renew_provider(
        &self,
        provider: ProviderKind,
    ) -> Result<ProviderRenewalResult, SyncError> {
        let mut result = ProviderRenewalResult::default();
        if !self.providers.is_enabled(provider) {
            debug!(%provider, "provider not configured, skipping renewal");
            return Ok(result);
        }

        let due = self.due_connections(provider, Utc::now()).await?;
        info!(%provider, count = due.len(), "connections due for webhook renewal");

        for connection in due {
            let connection_id = connection.id;
            let outcome = match provider {
                ProviderKind::Gmail => self.renew_gmail_connection(connection).await,
                ProviderKind::Outlook => self.renew_outlook_connection(connection).await,
            };
            if let Err(e) = &outcome {
                warn!(connection_id, %provider, error = %e, "webhook renewal failed");
            }
            result.record(connection_id, &outcome);
        }
        Ok(result)
    }

    /// Refreshes the token if needed, re-issues the INBOX watch, stores the new expiry.
    pub async fn renew_gmail_connection(
        &self,
        connection: DbEmailConnection,
    ) -> Result<DateTime<Utc>, SyncError> {
        let topic = self
            .providers
            .gmail_config()?
            .pubsub_topic
            .clone()
            .ok_or_else(|| SyncError::Config("GOOGLE_PUBSUB_TOPIC is not configured".to_string()))?;

        let connection = self.providers.ensure_fresh_token(&self.db, connection).await?;
        let watch = self
            .providers
            .gmail(&connection.access_token)?
            .watch_inbox(&topic)
            .await?;

        self.db
            .patch_connection(
                connection.id,
                ConnectionPatch::webhook(None, watch.expires_at),
            )
            .await?;
        info!(
            connection_id = connection.id,
            history_id = %watch.history_id,
            expires_at = %watch.expires_at,
            "gmail watch renewed"
        );
        Ok(watch.expires_at)
    }

    /// Refreshes the token if needed, then extends the subscription; when the
    /// extension fails a new subscription replaces it.
    pub async fn renew_outlook_connection(
        &self,
        connection: DbEmailConnection,
    ) -> Result<DateTime<Utc>, SyncError> {
        let connection = self.providers.ensure_fresh_token(&self.db, connection).await?;
        let graph = self.providers.outlook(&connection.access_token)?;
        let expires_at = OutlookSync::subscription_expiry_from(Utc::now());

        if let Some(subscription_id) = connection.webhook_subscription_id.as_deref() {
            match graph.renew_subscription(subscription_id, expires_at).await {
                Ok(sub) => {
                    self.db
                        .patch_connection(
                            connection.id,
                            ConnectionPatch::webhook(None, sub.expiration_date_time),
                        )
                        .await?;
                    info!(
                        connection_id = connection.id,
                        subscription_id,
                        expires_at = %sub.expiration_date_time,
                        "graph subscription extended"
                    );
                    return Ok(sub.expiration_date_time);
                }
                Err(e) => {
                    warn!(
                        connection_id = connection.id,
                        subscription_id,
                        error = %e,
                        "graph subscription extension failed, creating a new one"
                    );
                }
            }
        }

        self.create_outlook_subscription(&connection, &graph, expires_at)
            .await
    }

    async fn create_outlook_subscription(
        &self,
        connection: &DbEmailConnection,
        graph: &OutlookSync,
        expires_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SyncError> {
        let cfg = self.providers.outlook_config()?;
        let notification_url = cfg.notification_url.as_ref().ok_or_else(|| {
            SyncError::Config("OUTLOOK_WEBHOOK_URL is not configured".to_string())
        })?;

        let sub = graph
            .create_subscription(
                notification_url.as_str(),
                cfg.client_state.as_deref(),
                expires_at,
            )
            .await?;
        self.db
            .patch_connection(
                connection.id,
                ConnectionPatch::webhook(Some(sub.id.clone()), sub.expiration_date_time),
            )
            .await?;
        info!(
            connection_id = connection.id,
            subscription_id = %sub.id,
            expires_at = %sub.expiration_date_time,
            "graph subscription created"
        );
        Ok(sub.expiration_date_time)
    }

    /// Initial registration after a connection is created. Missing push
    /// configuration (Pub/Sub topic, notification URL) skips registration.
    pub async fn register_webhook(
        &self,
        connection: &DbEmailConnection,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        match connection.provider {
            ProviderKind::Gmail => {
                if self.providers.gmail_config()?.pubsub_topic.is_none() {
                    debug!(connection_id = connection.id, "no pub/sub topic, gmail watch skipped");
                    return Ok(None);
                }
                self.renew_gmail_connection(connection.clone()).await.map(Some)
            }
            ProviderKind::Outlook => {
                if self.providers.outlook_config()?.notification_url.is_none() {
                    debug!(connection_id = connection.id, "no notification url, graph subscription skipped");
                    return Ok(None);
                }
                let graph = self.providers.outlook(&connection.access_token)?;
                let expires_at = OutlookSync::subscription_expiry_from(Utc::now());
                self.create_outlook_subscription(connection, &graph, expires_at)
                    .await
                    .map(Some)
            }
        }
    }

    /// Best-effort teardown of the upstream registration before a connection is deleted.
    pub async fn unregister_webhook(&self, connection: &DbEmailConnection) {
        let outcome = match connection.provider {
            ProviderKind::Gmail if connection.webhook_expiry.is_some() => {
                match self.providers.gmail(&connection.access_token) {
                    Ok(gmail) => gmail.stop().await,
                    Err(e) => Err(e),
                }
            }
            ProviderKind::Outlook => match connection.webhook_subscription_id.as_deref() {
                Some(subscription_id) => match self.providers.outlook(&connection.access_token) {
                    Ok(graph) => graph.delete_subscription(subscription_id).await,
                    Err(e) => Err(e),
                },
                None => Ok(()),
            },
            ProviderKind::Gmail => Ok(()),
        };

        if let Err(e) = outcome {
            warn!(
                connection_id = connection.id,
                provider = %connection.provider,
                error = %e,
                "webhook teardown failed, continuing with delete"
            );
        }
    }

    pub async fn status(&self, user_id: &str) -> Result<Vec<WebhookStatus>, SyncError> {
        let now = Utc::now();
        let connections = self.db.list_user_connections(user_id).await?;

        Ok(connections
            .into_iter()
            .map(|c| WebhookStatus {
                needs_renewal: c.needs_renewal(now, Self::threshold(c.provider)),
                expires_in_hours: c.webhook_expiry.map(|e| (e - now).num_hours()),
                connection_id: c.id,
                provider: c.provider,
                email_address: c.email_address,
                webhook_subscription_id: c.webhook_subscription_id,
                webhook_expiry: c.webhook_expiry,
            })
            .collect())
    }
}
