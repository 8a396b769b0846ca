use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;
use super::provider::ProviderError;
use crate::db::ProviderKind;

#[derive(Debug, ThisError)]
pub enum SyncError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("{0} is not configured on this server")]
    ProviderDisabled(ProviderKind),

    #[error("{provider} API error: {source}")]
    Provider {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl SyncError {
    pub fn provider(provider: ProviderKind, source: ProviderError) -> Self {
        SyncError::Provider { provider, source }
    }

    /// True when the storage layer (pool or db actor) could not serve the request.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, SyncError::DatabaseError(_) | SyncError::RactorError(_))
    }

    /// Stable machine-readable code surfaced to RPC callers.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::BadRequest(_)
            | SyncError::ProviderDisabled(_)
            | SyncError::Oauth(OauthError::Flow { .. }) => "BAD_REQUEST",
            SyncError::Validation(_) => "VALIDATION_ERROR",
            SyncError::Unauthorized => "UNAUTHORIZED",
            SyncError::Forbidden(_) => "FORBIDDEN",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::NotImplemented(_) => "NOT_IMPLEMENTED",
            SyncError::DatabaseError(_) | SyncError::RactorError(_) => "DATABASE_ERROR",
            SyncError::Provider { .. } | SyncError::Oauth(_) => "EXTERNAL_SERVICE_ERROR",
            SyncError::Timeout(_) => "TIMEOUT",
            SyncError::JsonError(_)
            | SyncError::UrlError(_)
            | SyncError::Config(_)
            | SyncError::UnexpectedError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SyncError::BadRequest(_)
            | SyncError::Validation(_)
            | SyncError::ProviderDisabled(_)
            | SyncError::Oauth(OauthError::Flow { .. }) => StatusCode::BAD_REQUEST,
            SyncError::Unauthorized => StatusCode::UNAUTHORIZED,
            SyncError::Forbidden(_) => StatusCode::FORBIDDEN,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            SyncError::DatabaseError(_) | SyncError::RactorError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SyncError::Provider { .. } | SyncError::Oauth(_) => StatusCode::BAD_GATEWAY,
            SyncError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::JsonError(_)
            | SyncError::UrlError(_)
            | SyncError::Config(_)
            | SyncError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Client errors carry their detail, everything else stays generic.
    fn public_message(&self) -> String {
        match self {
            SyncError::BadRequest(m)
            | SyncError::Validation(m)
            | SyncError::Forbidden(m)
            | SyncError::NotFound(m)
            | SyncError::NotImplemented(m) => m.clone(),
            SyncError::Unauthorized => "Authentication required.".to_string(),
            SyncError::ProviderDisabled(p) => format!("{p} integration is not enabled."),
            SyncError::Provider { provider, source } => {
                format!("{provider} request failed: {source}")
            }
            SyncError::Oauth(OauthError::Flow { message, .. }) => message.clone(),
            SyncError::Oauth(OauthError::InvalidGrant { .. }) => {
                "Mailbox authorization was revoked or expired. Reconnect the mailbox.".to_string()
            }
            SyncError::Oauth(_) => "OAuth token request failed.".to_string(),
            SyncError::Timeout(_) => "The operation timed out.".to_string(),
            SyncError::DatabaseError(_) | SyncError::RactorError(_) => {
                "Storage is temporarily unavailable.".to_string()
            }
            SyncError::JsonError(_)
            | SyncError::UrlError(_)
            | SyncError::Config(_)
            | SyncError::UnexpectedError(_) => "An internal server error occurred.".to_string(),
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let details = match &self {
            SyncError::Oauth(OauthError::Flow { details, .. }) => details.clone(),
            _ => None,
        };
        let body = ApiErrorObject {
            code: self.code().to_string(),
            message: self.public_message(),
            details,
        };
        (status, Json(ApiErrorBody { inner: body })).into_response()
    }
}

impl IsRetryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::Provider { source, .. } => source.is_retryable(),
            SyncError::Oauth(e) => e.is_retryable(),
            SyncError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Standardized API error response payload.
#[derive(Debug, Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_map_to_database_error() {
        let err = SyncError::RactorError("mailbox closed".to_string());
        assert!(err.is_storage_unavailable());
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = SyncError::UnexpectedError("token=abc".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("token"));
    }
}
