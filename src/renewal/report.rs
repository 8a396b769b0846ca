use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionFailure {
    pub connection_id: i64,
    pub message: String,
}

/// Per-provider tally of one renewal pass. One connection's failure lands in
/// `errors` and never stops the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderRenewalResult {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<ConnectionFailure>,
}

impl ProviderRenewalResult {
    pub(crate) fn record<T, E: std::fmt::Display>(&mut self, connection_id: i64, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.success += 1,
            Err(e) => {
                self.failed += 1;
                self.errors.push(ConnectionFailure {
                    connection_id,
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn attempted(&self) -> usize {
        self.success + self.failed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalReport {
    pub gmail: ProviderRenewalResult,
    pub outlook: ProviderRenewalResult,
}

impl RenewalReport {
    pub fn total_failed(&self) -> usize {
        self.gmail.failed + self.outlook.failed
    }
}

/// Webhook registration state of one connection, as shown to its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatus {
    pub connection_id: i64,
    pub provider: ProviderKind,
    pub email_address: String,
    pub webhook_subscription_id: Option<String>,
    pub webhook_expiry: Option<DateTime<Utc>>,
    pub expires_in_hours: Option<i64>,
    pub needs_renewal: bool,
}
