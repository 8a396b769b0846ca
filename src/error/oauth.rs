use super::IsRetryable;
use super::sync::SyncError;
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde_json::Value;
use thiserror::Error as ThisError;

const TOKEN_BODY_PREVIEW_CHARS: usize = 100;

/// Failures of the connect flow and of the Google / Microsoft token endpoints.
#[derive(Debug, ThisError)]
pub enum OauthError {
    /// Connect/callback problem caused by the browser round-trip; `code` is surfaced to the caller.
    #[error("OAuth flow error: {message}")]
    Flow {
        code: String,
        message: String,
        details: Option<Value>,
    },

    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The refresh token was revoked or has expired. Only a new consent fixes this.
    #[error("invalid_grant: mailbox authorization was revoked or expired, reconnect required{}", describe(.description))]
    InvalidGrant { description: Option<String> },

    /// Any other RFC 6749 error response (`invalid_client`, `unauthorized_client`, ...).
    #[error("token endpoint rejected the request: {error}{}", describe(.description))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("token endpoint returned an unreadable body ({message}): {body}")]
    MalformedResponse { message: String, body: String },

    #[error("OAuth client error: {0}")]
    Client(String),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl OauthError {
    pub(crate) fn flow(code: &str, message: impl Into<String>) -> Self {
        OauthError::Flow {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    /// True when the stored grant is dead and the user has to connect the mailbox again.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, OauthError::InvalidGrant { .. })
    }
}

impl IsRetryable for OauthError {
    fn is_retryable(&self) -> bool {
        match self {
            OauthError::Transport(e) => !e.is_decode(),
            // Microsoft answers transient outages with these instead of a 5xx.
            OauthError::Rejected { error, .. } => {
                matches!(error.as_str(), "temporarily_unavailable" | "server_error")
            }
            OauthError::Flow { .. }
            | OauthError::InvalidGrant { .. }
            | OauthError::MalformedResponse { .. }
            | OauthError::Client(_) => false,
        }
    }
}

type TokenRequestError = RequestTokenError<
    HttpClientError<ReqwestClientError>,
    StandardErrorResponse<BasicErrorResponseType>,
>;

impl From<TokenRequestError> for OauthError {
    fn from(e: TokenRequestError) -> Self {
        match e {
            RequestTokenError::ServerResponse(resp) => {
                let description = resp.error_description().cloned();
                match resp.error() {
                    BasicErrorResponseType::InvalidGrant => OauthError::InvalidGrant { description },
                    other => OauthError::Rejected {
                        error: other.to_string(),
                        description,
                    },
                }
            }
            RequestTokenError::Request(HttpClientError::Reqwest(e)) => OauthError::Transport(*e),
            RequestTokenError::Request(other) => OauthError::Client(other.to_string()),
            RequestTokenError::Parse(e, body) => {
                let body: String = String::from_utf8_lossy(&body)
                    .chars()
                    .take(TOKEN_BODY_PREVIEW_CHARS)
                    .collect();
                OauthError::MalformedResponse {
                    message: e.to_string(),
                    body,
                }
            }
            RequestTokenError::Other(message) => OauthError::Client(message),
        }
    }
}

impl From<TokenRequestError> for SyncError {
    fn from(e: TokenRequestError) -> Self {
        OauthError::from(e).into()
    }
}
