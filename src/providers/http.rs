use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::UPSTREAM_BODY_PREVIEW_CHARS;
use super::upstream_retry::{RetryPolicy, with_retry};
use crate::db::ProviderKind;
use crate::error::{ProviderError, SyncError};

/// Bearer-authenticated JSON client bound to one upstream API base URL.
#[derive(Clone)]
pub(crate) struct ProviderHttp {
    provider: ProviderKind,
    client: reqwest::Client,
    base: Url,
    access_token: String,
    retry: RetryPolicy,
}

impl ProviderHttp {
    pub(crate) fn new(
        provider: ProviderKind,
        client: reqwest::Client,
        base: Url,
        access_token: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            client,
            base,
            access_token,
            retry,
        }
    }

    fn url(&self, path: &str) -> Result<Url, SyncError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<T, SyncError> {
        let url = self.url(path)?;
        let resp = self
            .send(operation, || {
                self.client
                    .get(url.clone())
                    .query(query)
                    .headers(headers.clone())
            })
            .await?;
        self.decode(resp).await
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let resp = self
            .send(operation, || {
                self.client.request(method.clone(), url.clone()).json(body)
            })
            .await?;
        self.decode(resp).await
    }

    /// Request whose response body is ignored (`204 No Content` endpoints).
    pub(crate) async fn send_empty(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
    ) -> Result<(), SyncError> {
        let url = self.url(path)?;
        self.send(operation, || self.client.request(method.clone(), url.clone()))
            .await?;
        Ok(())
    }

    async fn send<F>(&self, operation: &'static str, build: F) -> Result<Response, SyncError>
    where
        F: Fn() -> RequestBuilder,
    {
        let provider = self.provider;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| SyncError::Validation("access token is not a valid header".into()))?;

        with_retry(provider, operation, self.retry, || {
            let request = build().header(AUTHORIZATION, bearer.clone());
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| SyncError::provider(provider, ProviderError::Request(e)))?;
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }

                let body = match resp.text().await {
                    Ok(text) => text.chars().take(UPSTREAM_BODY_PREVIEW_CHARS).collect(),
                    Err(e) => format!("<failed to read body: {e}>"),
                };
                debug!(%provider, operation, %status, body = %body, "upstream returned error status");
                Err(SyncError::provider(
                    provider,
                    ProviderError::UpstreamStatus { status, body },
                ))
            }
        })
        .await
    }

    async fn decode<T: DeserializeOwned>(&self, resp: Response) -> Result<T, SyncError> {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SyncError::provider(self.provider, ProviderError::Request(e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::provider(self.provider, ProviderError::Decode(e.to_string()))
        })
    }
}
