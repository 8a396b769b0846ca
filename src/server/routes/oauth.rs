use crate::db::{ConnectionCreate, DbEmailConnection, ProviderKind};
use crate::error::{OauthError, SyncError};
use crate::oauth_utils::IssuedTokens;
use crate::server::guards::CurrentUser;
use crate::server::router::AppState;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use serde_json::json;
use time::Duration;
use tracing::{error, info, warn};

const CSRF_COOKIE: &str = "crmsync_oauth_csrf_token";
const PKCE_COOKIE: &str = "crmsync_oauth_pkce_verifier";
const USER_COOKIE: &str = "crmsync_oauth_user_id";

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

struct OauthSession {
    csrf: String,
    pkce_verifier: String,
    user_id: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{provider}/connect", get(oauth_connect))
        .route("/{provider}/callback", get(oauth_callback))
}

fn parse_provider(raw: &str) -> Result<ProviderKind, SyncError> {
    raw.parse()
        .map_err(|_| SyncError::BadRequest(format!("invalid provider: {raw}")))
}

/// GET /api/oauth/{provider}/connect
///
/// Starts the PKCE flow for the calling user and redirects to the consent page.
pub async fn oauth_connect(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, SyncError> {
    let provider = parse_provider(&provider)?;
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = state.providers.oauth.authorize_url(provider, challenge)?;

    let secure = !state.insecure_cookie;
    let jar = jar
        .add(build_cookie(CSRF_COOKIE, csrf_token.secret().to_string(), secure))
        .add(build_cookie(PKCE_COOKIE, verifier.secret().to_string(), secure))
        .add(build_cookie(USER_COOKIE, user.user_id.clone(), secure));

    info!(%provider, user_id = %user.user_id, "dispatching OAuth redirect");
    Ok((jar, Redirect::temporary(auth_url.as_ref())))
}

/// GET /api/oauth/{provider}/callback
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    let (jar, session) = take_oauth_cookies(jar);

    let result = match parse_provider(&provider) {
        Ok(provider) => complete_connect(&state, provider, query, session).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(connection) => {
            info!(
                connection_id = connection.id,
                provider = %connection.provider,
                "email connection established"
            );
            let body = json!({
                "success": true,
                "connectionId": connection.id,
                "provider": connection.provider,
                "emailAddress": connection.email_address,
            });
            (jar, Json(body)).into_response()
        }
        Err(err) => {
            error!(%provider, error = %err, "OAuth callback failed");
            (jar, err.into_response()).into_response()
        }
    }
}

async fn complete_connect(
    state: &AppState,
    provider: ProviderKind,
    query: AuthCallbackQuery,
    session: Option<OauthSession>,
) -> Result<DbEmailConnection, SyncError> {
    if let Some(err) = query.error {
        return Err(OauthError::Flow {
            code: "OAUTH_DENIED".to_string(),
            message: query.error_description.unwrap_or_else(|| err.clone()),
            details: Some(json!({ "error": err })),
        }
        .into());
    }

    let session = session
        .ok_or_else(|| OauthError::flow("OAUTH_SESSION_MISSING", "Missing OAuth session cookies"))?;

    let (Some(code), Some(state_param)) = (query.code, query.state) else {
        return Err(OauthError::flow("OAUTH_CALLBACK_INVALID", "Missing code or state").into());
    };

    if state_param != session.csrf {
        return Err(OauthError::flow("CSRF_MISMATCH", "CSRF token mismatch").into());
    }

    let tokens = state
        .providers
        .oauth
        .exchange_code(provider, code, PkceCodeVerifier::new(session.pkce_verifier))
        .await
        .map_err(|e| OauthError::flow("TOKEN_EXCHANGE_FAILED", format!("Token exchange failed: {e}")))?;

    let email_address = resolve_mailbox(state, provider, &tokens).await?;

    let connection = state
        .db
        .upsert_connection(ConnectionCreate {
            user_id: session.user_id,
            provider,
            email_address,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_expiry: tokens.expires_at,
            scope: tokens.scope,
        })
        .await?;

    if state.providers.settings.enable_webhook_renewal {
        if let Err(e) = state.renewal.register_webhook(&connection).await {
            warn!(connection_id = connection.id, error = %e, "initial webhook registration failed");
        }
    }

    // Re-read so the response reflects the registered webhook.
    Ok(state
        .db
        .get_connection(connection.id)
        .await?
        .unwrap_or(connection))
}

async fn resolve_mailbox(
    state: &AppState,
    provider: ProviderKind,
    tokens: &IssuedTokens,
) -> Result<String, SyncError> {
    match provider {
        ProviderKind::Gmail => Ok(state
            .providers
            .gmail(&tokens.access_token)?
            .profile()
            .await?
            .email_address),
        ProviderKind::Outlook => {
            let me = state.providers.outlook(&tokens.access_token)?.me().await?;
            me.mailbox()
                .map(str::to_string)
                .ok_or_else(|| OauthError::flow("MAILBOX_UNKNOWN", "Graph user has no mailbox").into())
        }
    }
}

fn take_oauth_cookies(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<OauthSession>) {
    let csrf = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let pkce = jar.get(PKCE_COOKIE).map(|c| c.value().to_string());
    let user = jar.get(USER_COOKIE).map(|c| c.value().to_string());

    let jar = jar
        .remove(Cookie::build(CSRF_COOKIE).path("/"))
        .remove(Cookie::build(PKCE_COOKIE).path("/"))
        .remove(Cookie::build(USER_COOKIE).path("/"));

    match (csrf, pkce, user) {
        (Some(csrf), Some(pkce_verifier), Some(user_id)) => (
            jar,
            Some(OauthSession {
                csrf,
                pkce_verifier,
                user_id,
            }),
        ),
        _ => (jar, None),
    }
}

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}
