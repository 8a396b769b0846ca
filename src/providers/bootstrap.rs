use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::gmail::GmailSync;
use super::http::ProviderHttp;
use super::oauth::ProviderOauth;
use super::outlook::OutlookSync;
use super::upstream_retry::RetryPolicy;
use super::MailProvider;
use crate::config::{Config, GmailResolvedConfig, OutlookResolvedConfig, SyncSettings};
use crate::db::{DbEmailConnection, ProviderKind};
use crate::error::SyncError;

const USER_AGENT: &str = concat!("crmsync/", env!("CARGO_PKG_VERSION"));

/// Resolved provider settings plus the shared outbound HTTP client.
///
/// A provider whose credentials are missing is `None` here; every entry point that
/// needs it answers `SyncError::ProviderDisabled` instead of failing at startup.
#[derive(Clone)]
pub struct Providers {
    pub http: reqwest::Client,
    pub gmail_cfg: Option<Arc<GmailResolvedConfig>>,
    pub outlook_cfg: Option<Arc<OutlookResolvedConfig>>,
    pub settings: Arc<SyncSettings>,
    pub oauth: ProviderOauth,
    pub retry: RetryPolicy,
}

impl Providers {
    pub fn from_config(cfg: &Config) -> Result<Self, SyncError> {
        let settings = cfg.sync_settings();
        let http = build_client(cfg.proxy.as_ref(), settings.request_timeout)?;
        Self::new(http, cfg.gmail(), cfg.outlook(), settings)
    }

    pub fn new(
        http: reqwest::Client,
        gmail_cfg: Option<GmailResolvedConfig>,
        outlook_cfg: Option<OutlookResolvedConfig>,
        settings: SyncSettings,
    ) -> Result<Self, SyncError> {
        let retry = RetryPolicy::from_settings(&settings);
        let oauth = ProviderOauth::new(http.clone(), gmail_cfg.as_ref(), outlook_cfg.as_ref(), retry)?;

        info!(
            gmail_enabled = gmail_cfg.is_some(),
            gmail_pubsub_topic = %gmail_cfg.as_ref().and_then(|c| c.pubsub_topic.as_deref()).unwrap_or("<none>"),
            outlook_enabled = outlook_cfg.is_some(),
            outlook_notification_url = %outlook_cfg.as_ref().and_then(|c| c.notification_url.as_ref()).map(|u| u.as_str()).unwrap_or("<none>"),
            retry_attempts = retry.attempts,
            retry_base_delay = ?retry.base_delay,
            "Provider config (effective)"
        );

        Ok(Self {
            http,
            gmail_cfg: gmail_cfg.map(Arc::new),
            outlook_cfg: outlook_cfg.map(Arc::new),
            settings: Arc::new(settings),
            oauth,
            retry,
        })
    }

    pub fn is_enabled(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Gmail => self.gmail_cfg.is_some(),
            ProviderKind::Outlook => self.outlook_cfg.is_some(),
        }
    }

    pub fn gmail_config(&self) -> Result<&GmailResolvedConfig, SyncError> {
        self.gmail_cfg
            .as_deref()
            .ok_or(SyncError::ProviderDisabled(ProviderKind::Gmail))
    }

    pub fn outlook_config(&self) -> Result<&OutlookResolvedConfig, SyncError> {
        self.outlook_cfg
            .as_deref()
            .ok_or(SyncError::ProviderDisabled(ProviderKind::Outlook))
    }

    pub fn gmail(&self, access_token: &str) -> Result<GmailSync, SyncError> {
        let cfg = self.gmail_config()?;
        let gmail = self.http_for(ProviderKind::Gmail, cfg.api_url.clone(), access_token);
        let calendar = self.http_for(ProviderKind::Gmail, cfg.calendar_api_url.clone(), access_token);
        Ok(GmailSync::new(gmail, calendar, self.settings.calendar_lookback))
    }

    pub fn outlook(&self, access_token: &str) -> Result<OutlookSync, SyncError> {
        let cfg = self.outlook_config()?;
        let graph = self.http_for(ProviderKind::Outlook, cfg.graph_api_url.clone(), access_token);
        Ok(OutlookSync::new(graph, self.settings.calendar_lookback))
    }

    /// Adapter for a stored connection, keyed on its provider.
    pub fn adapter_for(
        &self,
        connection: &DbEmailConnection,
    ) -> Result<Box<dyn MailProvider>, SyncError> {
        Ok(match connection.provider {
            ProviderKind::Gmail => Box::new(self.gmail(&connection.access_token)?),
            ProviderKind::Outlook => Box::new(self.outlook(&connection.access_token)?),
        })
    }

    fn http_for(&self, provider: ProviderKind, base: url::Url, access_token: &str) -> ProviderHttp {
        ProviderHttp::new(
            provider,
            self.http.clone(),
            base,
            access_token.to_string(),
            self.retry,
        )
    }
}

pub fn build_client(proxy: Option<&url::Url>, timeout: Duration) -> Result<reqwest::Client, SyncError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        // Token endpoints must not follow redirects.
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url.as_str())
            .map_err(|e| SyncError::Config(format!("invalid proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SyncError::Config(format!("failed to build reqwest client: {e}")))
}
