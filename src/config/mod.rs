mod providers;

pub use providers::{GmailResolvedConfig, OutlookResolvedConfig, SyncSettings};

use crate::error::SyncError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time::Duration,
};
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Application configuration managed by Figment.
///
/// Sources, later wins: built-in defaults, optional `config.toml`, raw environment variables
/// (field names map to env vars in UPPER_SNAKE_CASE, e.g. `gmail_client_id` <- `GMAIL_CLIENT_ID`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server listen address. Env: `LISTEN_ADDR`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port. Env: `LISTEN_PORT`. Default: `3000`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// SQLite database URL (required). Env: `DATABASE_URL`.
    #[serde(default)]
    pub database_url: String,

    /// Shared secret the front-end gateway presents on RPC calls (required).
    /// Env: `SESSION_SECRET`.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub session_secret: String,

    /// Log level used when `RUST_LOG` is unset. Env: `LOGLEVEL`. Default: `info`.
    #[serde(default)]
    pub loglevel: String,

    /// Optional upstream HTTP proxy for provider calls. Env: `PROXY`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Mark OAuth cookies as non-`Secure` (plain-http local development only).
    /// Env: `INSECURE_COOKIE`. Default: `false`.
    #[serde(default)]
    pub insecure_cookie: bool,

    // -----------------------------------------------------------------------
    // Gmail / Google
    // -----------------------------------------------------------------------
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub gmail_client_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub gmail_client_secret: Option<String>,
    /// Defaults to `http://localhost:{port}/api/oauth/gmail/callback`.
    #[serde(default)]
    pub gmail_redirect_uri: Option<Url>,
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub google_cloud_project_id: Option<String>,
    /// Topic short name, or a full `projects/{p}/topics/{t}` path.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub google_pubsub_topic: Option<String>,

    #[serde(default = "default_gmail_api_url")]
    pub gmail_api_url: Url,
    #[serde(default = "default_google_calendar_api_url")]
    pub google_calendar_api_url: Url,
    #[serde(default = "default_google_auth_url")]
    pub google_auth_url: Url,
    #[serde(default = "default_google_token_url")]
    pub google_token_url: Url,

    // -----------------------------------------------------------------------
    // Outlook / Microsoft Graph
    // -----------------------------------------------------------------------
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub outlook_client_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub outlook_client_secret: Option<String>,
    /// Defaults to `http://localhost:{port}/api/oauth/outlook/callback`.
    #[serde(default)]
    pub outlook_redirect_uri: Option<Url>,
    /// Env: `OUTLOOK_TENANT_ID`. Default: `common`.
    #[serde(default = "default_outlook_tenant_id", deserialize_with = "deserialize_string_lax")]
    pub outlook_tenant_id: String,
    /// Public URL Graph posts change notifications to (`.../api/webhooks/outlook`).
    /// Subscriptions are not created when unset.
    #[serde(default)]
    pub outlook_webhook_url: Option<Url>,
    /// Opaque value echoed back by Graph in every notification.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub outlook_client_state: Option<String>,

    #[serde(default = "default_graph_api_url")]
    pub graph_api_url: Url,
    #[serde(default = "default_microsoft_login_url")]
    pub microsoft_login_url: Url,

    // -----------------------------------------------------------------------
    // Sync / renewal behaviour
    // -----------------------------------------------------------------------
    /// Env: `ENABLE_EMAIL_SYNC`. Default: `true`.
    #[serde(default = "default_true")]
    pub enable_email_sync: bool,

    /// Env: `ENABLE_WEBHOOK_RENEWAL`. Default: `true`.
    #[serde(default = "default_true")]
    pub enable_webhook_renewal: bool,

    /// Per-request timeout for provider calls and inbound webhook handling.
    /// Env: `WEBHOOK_TIMEOUT_MS`. Default: `30000`.
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    /// Total attempts per provider call, first try included.
    /// Env: `WEBHOOK_RETRY_ATTEMPTS`. Default: `3`.
    #[serde(default = "default_retry_attempts")]
    pub webhook_retry_attempts: usize,

    /// First backoff delay; doubles on each further attempt. Env: `RETRY_BASE_DELAY_MS`.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_fetch_limit")]
    pub email_fetch_limit: usize,

    #[serde(default = "default_fetch_limit")]
    pub calendar_fetch_limit: usize,

    /// Calendar fetch only returns events that started within this many days.
    #[serde(default = "default_calendar_lookback_days")]
    pub calendar_lookback_days: i64,

    /// Env: `IDEMPOTENCY_RETENTION_DAYS`. Default: `30`.
    #[serde(default = "default_retention_days")]
    pub idempotency_retention_days: i64,

    /// Six-field cron (with seconds), evaluated in UTC. Default: daily at 02:00.
    #[serde(default = "default_renewal_cron")]
    pub renewal_cron: String,

    /// Default: every 6 hours.
    #[serde(default = "default_health_check_cron")]
    pub health_check_cron: String,

    /// Default: daily at 03:00.
    #[serde(default = "default_idempotency_cleanup_cron")]
    pub idempotency_cleanup_cron: String,

    /// Wall-clock bound on one scheduled renewal run. Default: `1800`.
    #[serde(default = "default_renewal_job_timeout_secs")]
    pub renewal_job_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            database_url: String::new(),
            loglevel: "info".to_string(),
            // No insecure default. `Config::from_env()` enforces non-empty.
            session_secret: String::new(),
            proxy: None,
            insecure_cookie: false,
            gmail_client_id: None,
            gmail_client_secret: None,
            gmail_redirect_uri: None,
            google_cloud_project_id: None,
            google_pubsub_topic: None,
            gmail_api_url: default_gmail_api_url(),
            google_calendar_api_url: default_google_calendar_api_url(),
            google_auth_url: default_google_auth_url(),
            google_token_url: default_google_token_url(),
            outlook_client_id: None,
            outlook_client_secret: None,
            outlook_redirect_uri: None,
            outlook_tenant_id: default_outlook_tenant_id(),
            outlook_webhook_url: None,
            outlook_client_state: None,
            graph_api_url: default_graph_api_url(),
            microsoft_login_url: default_microsoft_login_url(),
            enable_email_sync: true,
            enable_webhook_renewal: true,
            webhook_timeout_ms: default_webhook_timeout_ms(),
            webhook_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            email_fetch_limit: default_fetch_limit(),
            calendar_fetch_limit: default_fetch_limit(),
            calendar_lookback_days: default_calendar_lookback_days(),
            idempotency_retention_days: default_retention_days(),
            renewal_cron: default_renewal_cron(),
            health_check_cron: default_health_check_cron(),
            idempotency_cleanup_cron: default_idempotency_cleanup_cron(),
            renewal_job_timeout_secs: default_renewal_job_timeout_secs(),
        }
    }
}

impl Config {
    /// Builds a Figment that merges defaults, an optional config TOML file and the environment.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        };
        figment.merge(Env::raw())
    }

    /// Loads configuration and validates the genuinely required fields.
    ///
    /// Missing provider credentials are not an error: the provider is simply disabled.
    pub fn from_env() -> Result<Self, SyncError> {
        let cfg: Self = Self::figment()
            .extract()
            .map_err(|e| SyncError::Config(format!("failed to extract configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.database_url.trim().is_empty() {
            return Err(SyncError::Config(
                "DATABASE_URL must be set and non-empty".to_string(),
            ));
        }
        if self.session_secret.trim().is_empty() {
            return Err(SyncError::Config(
                "SESSION_SECRET must be set and non-empty".to_string(),
            ));
        }
        if self.webhook_retry_attempts == 0 {
            return Err(SyncError::Config(
                "WEBHOOK_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Gmail settings, or `None` when client credentials are missing.
    pub fn gmail(&self) -> Option<GmailResolvedConfig> {
        GmailResolvedConfig::resolve(self)
    }

    /// Outlook settings, or `None` when client credentials are missing.
    pub fn outlook(&self) -> Option<OutlookResolvedConfig> {
        OutlookResolvedConfig::resolve(self)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings::resolve(self)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

fn deserialize_opt_string_lax<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;

    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_outlook_tenant_id() -> String {
    "common".to_string()
}

fn default_webhook_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_fetch_limit() -> usize {
    50
}

fn default_calendar_lookback_days() -> i64 {
    30
}

fn default_retention_days() -> i64 {
    30
}

fn default_renewal_cron() -> String {
    "0 0 2 * * *".to_string()
}

fn default_health_check_cron() -> String {
    "0 0 */6 * * *".to_string()
}

fn default_idempotency_cleanup_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_renewal_job_timeout_secs() -> u64 {
    30 * 60
}

fn default_gmail_api_url() -> Url {
    Url::parse("https://gmail.googleapis.com/gmail/v1/")
        .expect("default gmail_api_url must be a valid URL")
}

fn default_google_calendar_api_url() -> Url {
    Url::parse("https://www.googleapis.com/calendar/v3/")
        .expect("default google_calendar_api_url must be a valid URL")
}

fn default_google_auth_url() -> Url {
    Url::parse("https://accounts.google.com/o/oauth2/v2/auth")
        .expect("default google_auth_url must be a valid URL")
}

fn default_google_token_url() -> Url {
    Url::parse("https://oauth2.googleapis.com/token")
        .expect("default google_token_url must be a valid URL")
}

fn default_graph_api_url() -> Url {
    Url::parse("https://graph.microsoft.com/v1.0/")
        .expect("default graph_api_url must be a valid URL")
}

fn default_microsoft_login_url() -> Url {
    Url::parse("https://login.microsoftonline.com/")
        .expect("default microsoft_login_url must be a valid URL")
}
