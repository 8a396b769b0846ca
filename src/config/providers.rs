use super::Config;
use std::time::Duration;
use url::Url;

/// Effective Gmail + Google Calendar settings.
#[derive(Debug, Clone)]
pub struct GmailResolvedConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    /// Full `projects/{project}/topics/{topic}` path; watch calls are skipped when unset.
    pub pubsub_topic: Option<String>,
    pub api_url: Url,
    pub calendar_api_url: Url,
    pub auth_url: Url,
    pub token_url: Url,
    pub scopes: Vec<String>,
}

impl GmailResolvedConfig {
    pub(super) fn resolve(cfg: &Config) -> Option<Self> {
        let client_id = cfg.gmail_client_id.clone()?;
        let client_secret = cfg.gmail_client_secret.clone()?;
        let redirect_uri = cfg
            .gmail_redirect_uri
            .clone()
            .unwrap_or_else(|| local_callback(cfg.listen_port, "gmail"));

        let pubsub_topic = cfg.google_pubsub_topic.as_deref().and_then(|topic| {
            if topic.starts_with("projects/") {
                Some(topic.to_string())
            } else {
                cfg.google_cloud_project_id
                    .as_deref()
                    .map(|project| format!("projects/{project}/topics/{topic}"))
            }
        });

        Some(Self {
            client_id,
            client_secret,
            redirect_uri,
            pubsub_topic,
            api_url: with_trailing_slash(cfg.gmail_api_url.clone()),
            calendar_api_url: with_trailing_slash(cfg.google_calendar_api_url.clone()),
            auth_url: cfg.google_auth_url.clone(),
            token_url: cfg.google_token_url.clone(),
            scopes: vec![
                "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                "https://www.googleapis.com/auth/calendar.readonly".to_string(),
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
            ],
        })
    }
}

/// Effective Outlook / Microsoft Graph settings.
#[derive(Debug, Clone)]
pub struct OutlookResolvedConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub tenant_id: String,
    pub graph_api_url: Url,
    pub auth_url: Url,
    pub token_url: Url,
    /// Subscriptions are only created when this is set.
    pub notification_url: Option<Url>,
    pub client_state: Option<String>,
    pub scopes: Vec<String>,
}

impl OutlookResolvedConfig {
    pub(super) fn resolve(cfg: &Config) -> Option<Self> {
        let client_id = cfg.outlook_client_id.clone()?;
        let client_secret = cfg.outlook_client_secret.clone()?;
        let redirect_uri = cfg
            .outlook_redirect_uri
            .clone()
            .unwrap_or_else(|| local_callback(cfg.listen_port, "outlook"));

        let login = with_trailing_slash(cfg.microsoft_login_url.clone());
        let tenant = cfg.outlook_tenant_id.trim();
        let auth_url = login
            .join(&format!("{tenant}/oauth2/v2.0/authorize"))
            .ok()?;
        let token_url = login.join(&format!("{tenant}/oauth2/v2.0/token")).ok()?;

        Some(Self {
            client_id,
            client_secret,
            redirect_uri,
            tenant_id: tenant.to_string(),
            graph_api_url: with_trailing_slash(cfg.graph_api_url.clone()),
            auth_url,
            token_url,
            notification_url: cfg.outlook_webhook_url.clone(),
            client_state: cfg.outlook_client_state.clone(),
            scopes: vec![
                "offline_access".to_string(),
                "User.Read".to_string(),
                "Mail.Read".to_string(),
                "Calendars.Read".to_string(),
            ],
        })
    }
}

/// Provider-agnostic knobs for sync, retry and renewal.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub enable_email_sync: bool,
    pub enable_webhook_renewal: bool,
    pub request_timeout: Duration,
    pub retry_attempts: usize,
    pub retry_base_delay: Duration,
    pub email_fetch_limit: usize,
    pub calendar_fetch_limit: usize,
    pub calendar_lookback: chrono::Duration,
    pub idempotency_retention: chrono::Duration,
    pub renewal_job_timeout: Duration,
}

impl SyncSettings {
    pub(super) fn resolve(cfg: &Config) -> Self {
        Self {
            enable_email_sync: cfg.enable_email_sync,
            enable_webhook_renewal: cfg.enable_webhook_renewal,
            request_timeout: cfg.webhook_timeout(),
            retry_attempts: cfg.webhook_retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            email_fetch_limit: cfg.email_fetch_limit,
            calendar_fetch_limit: cfg.calendar_fetch_limit,
            calendar_lookback: chrono::Duration::days(cfg.calendar_lookback_days),
            idempotency_retention: chrono::Duration::days(cfg.idempotency_retention_days),
            renewal_job_timeout: Duration::from_secs(cfg.renewal_job_timeout_secs),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::resolve(&Config::default())
    }
}

fn local_callback(port: u16, provider: &str) -> Url {
    Url::parse(&format!(
        "http://localhost:{port}/api/oauth/{provider}/callback"
    ))
    .expect("localhost callback must be a valid URL")
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
