//! Caller authentication for the gateway-facing routes.
//!
//! The CRM front-end backend is the only caller: it presents the shared session
//! secret (`Authorization: Bearer` or `x-api-key`) and names the signed-in user in
//! `x-user-id`. Webhook routes are not guarded here.

use crate::server::router::AppState;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderName, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde_json::json;
use subtle::ConstantTimeEq;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
const MAX_USER_ID_LEN: usize = 256;

fn extract_header_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(k) = headers.get(X_API_KEY).and_then(|v| v.to_str().ok()) {
        return Some(k.to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

fn check_key(parts: &Parts, state: &AppState) -> Result<(), AuthError> {
    let key = extract_header_token(&parts.headers).ok_or(AuthError::MissingKey)?;
    let expected = state.api_key.as_ref();
    if key.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::InvalidKey)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl FromRequestParts<AppState> for RequireKeyAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_key(parts, state)?;
        Ok(RequireKeyAuth)
    }
}

/// Authenticated gateway call on behalf of one CRM user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_key(parts, state)?;

        let user_id = parts
            .headers
            .get(X_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_USER_ID_LEN)
            .ok_or(AuthError::MissingUser)?;

        Ok(CurrentUser {
            user_id: user_id.to_string(),
        })
    }
}

pub enum AuthError {
    MissingKey,
    InvalidKey,
    MissingUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingKey => "Missing API key",
            AuthError::InvalidKey => "Invalid API key",
            AuthError::MissingUser => "Missing x-user-id header",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "code": "UNAUTHORIZED", "message": message } })),
        )
            .into_response()
    }
}
