use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Mail/calendar provider backing a connection. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProviderKind {
    Gmail,
    Outlook,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gmail => "gmail",
            ProviderKind::Outlook => "outlook",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(ProviderKind::Gmail),
            "outlook" => Ok(ProviderKind::Outlook),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbEmailConnection {
    pub id: i64,
    pub user_id: String,
    pub provider: ProviderKind,
    pub email_address: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub webhook_subscription_id: Option<String>,
    pub webhook_expiry: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbEmailConnection {
    /// Whether the webhook registration lapses before `now + threshold`.
    /// Connections that never registered a webhook are not renewal candidates.
    pub fn needs_renewal(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.is_active
            && self
                .webhook_expiry
                .is_some_and(|expiry| expiry <= now + threshold)
    }

    /// Whether the access token is expired or expires within `skew`.
    /// An unknown expiry is treated as still valid.
    pub fn token_expires_within(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        self.token_expiry.is_some_and(|expiry| expiry <= now + skew)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbContact {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbLead {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbActivity {
    pub id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub activity_type: String,
    pub subject: String,
    pub notes: Option<String>,
    pub activity_date: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub contact_id: Option<i64>,
    pub lead_id: Option<i64>,
    pub account_id: Option<i64>,
    pub user_id: String,
    pub email_message_id: Option<String>,
    pub email_thread_id: Option<String>,
    pub email_provider: Option<ProviderKind>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub email_body: Option<String>,
    pub email_html_body: Option<String>,
    pub is_inbound: Option<bool>,
    pub external_event_id: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload written after a successful OAuth callback.
#[derive(Debug, Clone)]
pub struct ConnectionCreate {
    pub user_id: String,
    pub provider: ProviderKind,
    pub email_address: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Insert payload for a synced email or calendar activity.
#[derive(Debug, Clone, Default)]
pub struct ActivityCreate {
    pub activity_type: String,
    pub subject: String,
    pub notes: Option<String>,
    pub activity_date: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub contact_id: Option<i64>,
    pub lead_id: Option<i64>,
    pub account_id: Option<i64>,
    pub user_id: String,
    pub email_message_id: Option<String>,
    pub email_thread_id: Option<String>,
    pub email_provider: Option<ProviderKind>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    pub email_body: Option<String>,
    pub email_html_body: Option<String>,
    pub is_inbound: Option<bool>,
    pub external_event_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactCreate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct LeadCreate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(expiry: Option<DateTime<Utc>>) -> DbEmailConnection {
        let now = Utc::now();
        DbEmailConnection {
            id: 1,
            user_id: "u1".to_string(),
            provider: ProviderKind::Gmail,
            email_address: "me@example.com".to_string(),
            access_token: "at".to_string(),
            refresh_token: None,
            token_expiry: None,
            scope: None,
            webhook_subscription_id: None,
            webhook_expiry: expiry,
            is_active: true,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn renewal_window_includes_soon_and_excludes_far_expiry() {
        let now = Utc::now();
        let two_days = chrono::Duration::days(2);
        assert!(connection(Some(now + chrono::Duration::hours(36))).needs_renewal(now, two_days));
        assert!(!connection(Some(now + chrono::Duration::days(5))).needs_renewal(now, two_days));
        assert!(!connection(None).needs_renewal(now, two_days));
    }

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Gmail".parse::<ProviderKind>(), Ok(ProviderKind::Gmail));
        assert_eq!("outlook".parse::<ProviderKind>(), Ok(ProviderKind::Outlook));
        assert!("yahoo".parse::<ProviderKind>().is_err());
    }
}
