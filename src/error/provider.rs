use super::IsRetryable;
use reqwest::StatusCode;
use thiserror::Error as ThisError;

/// Failure of a single upstream (Gmail / Calendar / Graph) API call.
#[derive(Debug, ThisError)]
pub enum ProviderError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream status {status}: {body}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("failed to decode upstream payload: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::UpstreamStatus { status, .. } => Some(*status),
            ProviderError::Request(e) => e.status(),
            ProviderError::Decode(_) => None,
        }
    }
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Request(e) => !e.is_decode(),
            ProviderError::UpstreamStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderError::Decode(_) => false,
        }
    }
}
