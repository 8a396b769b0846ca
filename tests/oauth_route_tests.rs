mod common;

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::{API_KEY, CaptureState, cleanup, spawn_db, spawn_test_server, test_config};
use crmsync::db::{DbActorHandle, ProviderKind};
use crmsync::providers::Providers;
use crmsync::server::{AppState, crmsync_router};
use serde_json::{Value, json};
use std::collections::HashMap;
use tower::ServiceExt;
use url::Url;

async fn upstream_handler(
    State(capture): State<CaptureState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    capture.push(method.clone(), &path, headers, &body);

    match (method, path.as_str()) {
        (Method::POST, "/google/token") => {
            let form: HashMap<String, String> =
                url::form_urlencoded::parse(&body).into_owned().collect();
            if form.get("code").map(String::as_str) != Some("good-code") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_grant" })),
                )
                    .into_response();
            }
            Json(json!({
                "access_token": "issued-at",
                "refresh_token": "issued-rt",
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/gmail.readonly"
            }))
            .into_response()
        }
        (Method::GET, "/gmail/v1/users/me/profile") => Json(json!({
            "emailAddress": "rep@acme.io",
            "messagesTotal": 10,
            "historyId": "99"
        }))
        .into_response(),
        (Method::POST, "/gmail/v1/users/me/watch") => Json(json!({
            "historyId": "100",
            "expiration": "1893456000000"
        }))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn build_app(prefix: &str) -> (Router, DbActorHandle, CaptureState, Url, std::path::PathBuf) {
    let capture = CaptureState::default();
    let upstream = spawn_test_server(
        Router::new()
            .fallback(upstream_handler)
            .with_state(capture.clone()),
    )
    .await;
    let (db, path) = spawn_db(prefix).await;
    let providers = Providers::from_config(&test_config(&upstream)).expect("providers");
    let state = AppState::new(db.clone(), providers, API_KEY.into(), true);
    (crmsync_router(state), db, capture, upstream, path)
}

fn cookie_header_from_set_cookie_headers(headers: &HeaderMap) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for v in headers.get_all(header::SET_COOKIE).iter() {
        let s = v.to_str().expect("set-cookie header was not valid utf-8");
        let first = s.split(';').next().unwrap_or("");
        let mut parts = first.splitn(2, '=');
        let name = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        if !name.trim().is_empty() {
            pairs.push(format!("{}={}", name.trim(), value));
        }
    }
    pairs.join("; ")
}

async fn start_connect(app: &Router, provider: &str) -> (Url, String) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/api/oauth/{provider}/connect"))
                .header("x-api-key", API_KEY)
                .header("x-user-id", "alice")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert!(resp.status().is_redirection());

    let location = resp
        .headers()
        .get(header::LOCATION)
        .expect("missing location header")
        .to_str()
        .expect("location header was not utf-8");
    let location = Url::parse(location).unwrap();
    (location, cookie_header_from_set_cookie_headers(resp.headers()))
}

fn callback(provider: &str, code: &str, state: &str, cookies: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("GET")
        .uri(format!("/api/oauth/{provider}/callback?code={code}&state={state}"));
    if !cookies.is_empty() {
        req = req.header(header::COOKIE, cookies);
    }
    req.body(Body::empty()).expect("failed to build request")
}

async fn body_json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn connect_redirects_with_offline_consent_and_pkce() {
    let (app, _db, _capture, upstream, path) = build_app("oauth-redirect").await;

    let (location, cookies) = start_connect(&app, "gmail").await;
    assert!(location.as_str().starts_with(upstream.join("google/auth").unwrap().as_str()));

    let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(params.get("access_type").map(String::as_str), Some("offline"));
    assert_eq!(params.get("prompt").map(String::as_str), Some("consent"));
    assert_eq!(params.get("code_challenge_method").map(String::as_str), Some("S256"));
    assert!(params.get("scope").unwrap().contains("gmail.readonly"));
    assert!(params.contains_key("state"));

    assert!(cookies.contains("crmsync_oauth_csrf_token="));
    assert!(cookies.contains("crmsync_oauth_pkce_verifier="));
    assert!(cookies.contains("crmsync_oauth_user_id="));
    // Private jar: the user id is not readable in the cookie.
    assert!(!cookies.contains("alice"));

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/oauth/yahoo/connect")
                .header("x-api-key", API_KEY)
                .header("x-user-id", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    cleanup(&path);
}

#[tokio::test]
async fn callback_creates_connection_and_registers_watch() {
    let (app, db, capture, _upstream, path) = build_app("oauth-callback").await;

    let (location, cookies) = start_connect(&app, "gmail").await;
    let state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let resp = app
        .clone()
        .oneshot(callback("gmail", "good-code", &state, &cookies))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["emailAddress"], "rep@acme.io");

    let connections = db.list_user_connections("alice").await.unwrap();
    assert_eq!(connections.len(), 1);
    let conn = &connections[0];
    assert_eq!(conn.provider, ProviderKind::Gmail);
    assert_eq!(conn.access_token, "issued-at");
    assert_eq!(conn.refresh_token.as_deref(), Some("issued-rt"));
    assert_eq!(
        conn.webhook_expiry.map(|e| e.timestamp_millis()),
        Some(1_893_456_000_000)
    );

    let reqs = capture.reqs.lock().unwrap();
    let token_req = reqs.iter().find(|r| r.path == "/google/token").unwrap();
    let form = String::from_utf8(token_req.body.clone()).unwrap();
    assert!(form.contains("code_verifier="));
    let watch = reqs
        .iter()
        .find(|r| r.path == "/gmail/v1/users/me/watch")
        .unwrap();
    let watch_body: Value = serde_json::from_slice(&watch.body).unwrap();
    assert_eq!(watch_body["topicName"], "projects/crm-test/topics/gmail");
    assert_eq!(watch_body["labelIds"], json!(["INBOX"]));
    drop(reqs);

    cleanup(&path);
}

#[tokio::test]
async fn callback_flow_errors_are_explicit() {
    let (app, db, _capture, _upstream, path) = build_app("oauth-errors").await;

    let resp = app
        .clone()
        .oneshot(callback("gmail", "good-code", "whatever", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "Missing OAuth session cookies");

    let (_location, cookies) = start_connect(&app, "gmail").await;
    let resp = app
        .clone()
        .oneshot(callback("gmail", "good-code", "forged-state", &cookies))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["message"], "CSRF token mismatch");

    let (location, cookies) = start_connect(&app, "gmail").await;
    let state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    let resp = app
        .clone()
        .oneshot(callback("gmail", "bad-code", &state, &cookies))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(db.list_user_connections("alice").await.unwrap().is_empty());

    cleanup(&path);
}
