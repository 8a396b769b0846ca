use oauth2::{
    AuthType, AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RefreshToken,
    Scope,
};
use tracing::info;
use url::Url;

use super::upstream_retry::{RetryPolicy, with_retry};
use crate::config::{GmailResolvedConfig, OutlookResolvedConfig};
use crate::db::ProviderKind;
use crate::error::{OauthError, SyncError};
use crate::oauth_utils::{IssuedTokens, OauthTokenResponse, StandardOauth2Client, build_oauth2_client};

struct ProviderOauthClient {
    client: StandardOauth2Client,
    scopes: Vec<Scope>,
}

/// OAuth2 authorization-code and refresh-token grants for both providers.
#[derive(Clone)]
pub struct ProviderOauth {
    http: reqwest::Client,
    gmail: Option<std::sync::Arc<ProviderOauthClient>>,
    outlook: Option<std::sync::Arc<ProviderOauthClient>>,
    retry: RetryPolicy,
}

impl ProviderOauth {
    pub fn new(
        http: reqwest::Client,
        gmail: Option<&GmailResolvedConfig>,
        outlook: Option<&OutlookResolvedConfig>,
        retry: RetryPolicy,
    ) -> Result<Self, SyncError> {
        let gmail = gmail
            .map(|cfg| {
                build_oauth2_client(
                    &cfg.client_id,
                    &cfg.client_secret,
                    cfg.auth_url.as_str(),
                    cfg.token_url.as_str(),
                    cfg.redirect_uri.as_str(),
                    AuthType::RequestBody,
                )
                .map(|client| ProviderOauthClient {
                    client,
                    scopes: to_scopes(&cfg.scopes),
                })
            })
            .transpose()?
            .map(std::sync::Arc::new);

        let outlook = outlook
            .map(|cfg| {
                build_oauth2_client(
                    &cfg.client_id,
                    &cfg.client_secret,
                    cfg.auth_url.as_str(),
                    cfg.token_url.as_str(),
                    cfg.redirect_uri.as_str(),
                    AuthType::RequestBody,
                )
                .map(|client| ProviderOauthClient {
                    client,
                    scopes: to_scopes(&cfg.scopes),
                })
            })
            .transpose()?
            .map(std::sync::Arc::new);

        Ok(Self {
            http,
            gmail,
            outlook,
            retry,
        })
    }

    fn client(&self, provider: ProviderKind) -> Result<&ProviderOauthClient, SyncError> {
        let client = match provider {
            ProviderKind::Gmail => self.gmail.as_deref(),
            ProviderKind::Outlook => self.outlook.as_deref(),
        };
        client.ok_or(SyncError::ProviderDisabled(provider))
    }

    /// Consent URL requesting offline access, plus the CSRF state to verify on callback.
    pub fn authorize_url(
        &self,
        provider: ProviderKind,
        pkce_challenge: PkceCodeChallenge,
    ) -> Result<(Url, CsrfToken), SyncError> {
        let oauth = self.client(provider)?;
        let mut req = oauth
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_scopes(oauth.scopes.iter().cloned());

        if provider == ProviderKind::Gmail {
            // Google only issues a refresh token with offline access on a fresh consent.
            req = req
                .add_extra_param("access_type", "offline")
                .add_extra_param("prompt", "consent");
        }

        Ok(req.url())
    }

    pub async fn exchange_code(
        &self,
        provider: ProviderKind,
        code: String,
        verifier: PkceCodeVerifier,
    ) -> Result<IssuedTokens, SyncError> {
        let oauth = self.client(provider)?;
        let token: OauthTokenResponse = oauth
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&self.http)
            .await
            .map_err(OauthError::from)?;
        info!(%provider, "OAuth2 code exchange completed successfully");
        Ok(IssuedTokens::from_response(&token))
    }

    /// Refresh-token grant, retried like any other upstream call.
    pub async fn refresh(
        &self,
        provider: ProviderKind,
        refresh_token: &str,
    ) -> Result<IssuedTokens, SyncError> {
        let oauth = self.client(provider)?;
        let refresh_token = RefreshToken::new(refresh_token.to_string());

        let token: OauthTokenResponse = with_retry(provider, "oauth.refresh", self.retry, || async {
            oauth
                .client
                .exchange_refresh_token(&refresh_token)
                .request_async(&self.http)
                .await
                .map_err(|e| SyncError::Oauth(OauthError::from(e)))
        })
        .await?;

        Ok(IssuedTokens::from_response(&token))
    }
}

fn to_scopes(scopes: &[String]) -> Vec<Scope> {
    scopes.iter().map(|s| Scope::new(s.clone())).collect()
}
