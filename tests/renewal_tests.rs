mod common;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use common::{CaptureState, cleanup, seed_connection, set_webhook, spawn_db, spawn_test_server, test_config};
use crmsync::config::Config;
use crmsync::db::{ConnectionPatch, DbActorHandle, ProviderKind};
use crmsync::providers::Providers;
use crmsync::renewal::RenewalService;
use serde_json::json;

const WATCH_EXPIRATION_MS: i64 = 1_893_456_000_000; // 2030-01-01T00:00:00Z

async fn upstream_handler(
    State(capture): State<CaptureState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let path = uri.path().to_string();
    capture.push(method.clone(), &path, headers, &body);

    if method == Method::POST && path == "/google/token" {
        let form = String::from_utf8_lossy(&body).into_owned();
        if form.contains("refresh_token=rt-revoked") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_grant",
                    "error_description": "Token has been expired or revoked."
                })),
            )
                .into_response();
        }
        if form.contains("refresh_token=rt-garbled") {
            return (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                "{not json",
            )
                .into_response();
        }
        return Json(json!({
            "access_token": "fresh-at",
            "token_type": "Bearer",
            "expires_in": 3599
        }))
        .into_response();
    }

    if bearer == "Bearer slow-token" {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }

    if bearer == "Bearer bad-token" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "invalid grant" } })),
        )
            .into_response();
    }

    match (method, path.as_str()) {
        (Method::POST, "/gmail/v1/users/me/watch") => Json(json!({
            "historyId": "4242",
            "expiration": WATCH_EXPIRATION_MS.to_string()
        }))
        .into_response(),
        (Method::PATCH, p) if p.starts_with("/graph/v1.0/subscriptions/") => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": "ResourceNotFound" } })),
        )
            .into_response(),
        (Method::POST, "/graph/v1.0/subscriptions") => Json(json!({
            "id": "sub-new",
            "resource": "me/mailFolders('Inbox')/messages",
            "changeType": "created",
            "expirationDateTime": "2030-01-03T00:00:00Z",
            "clientState": "client-state"
        }))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn build(prefix: &str) -> (RenewalService, DbActorHandle, CaptureState, std::path::PathBuf) {
    build_with(prefix, |_| {}).await
}

async fn build_with(
    prefix: &str,
    tweak: impl FnOnce(&mut Config),
) -> (RenewalService, DbActorHandle, CaptureState, std::path::PathBuf) {
    let capture = CaptureState::default();
    let upstream = spawn_test_server(
        Router::new()
            .fallback(upstream_handler)
            .with_state(capture.clone()),
    )
    .await;
    let (db, path) = spawn_db(prefix).await;
    let mut cfg = test_config(&upstream);
    tweak(&mut cfg);
    let providers = Providers::from_config(&cfg).expect("providers");
    (RenewalService::new(db.clone(), providers), db, capture, path)
}

#[tokio::test]
async fn gmail_threshold_selects_only_due_watches() {
    let (renewal, db, _capture, path) = build("renew-threshold").await;
    let now = Utc::now();

    let soon = seed_connection(&db, "u", ProviderKind::Gmail, "soon@acme.io", "t1").await;
    set_webhook(&db, soon.id, None, now + Duration::hours(36)).await;
    let later = seed_connection(&db, "u", ProviderKind::Gmail, "later@acme.io", "t2").await;
    set_webhook(&db, later.id, None, now + Duration::days(5)).await;
    // Never registered: nothing to renew.
    seed_connection(&db, "u", ProviderKind::Gmail, "never@acme.io", "t3").await;

    let due = renewal.due_connections(ProviderKind::Gmail, now).await.unwrap();
    let ids: Vec<i64> = due.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![soon.id]);

    cleanup(&path);
}

#[tokio::test]
async fn one_failing_connection_does_not_abort_the_batch() {
    let (renewal, db, capture, path) = build("renew-isolation").await;
    let expiry = Utc::now() + Duration::hours(12);

    let mut ids = Vec::new();
    for (i, token) in ["good-1", "bad-token", "good-2"].iter().enumerate() {
        let conn = seed_connection(&db, "u", ProviderKind::Gmail, &format!("m{i}@acme.io"), token).await;
        set_webhook(&db, conn.id, None, expiry).await;
        ids.push(conn.id);
    }

    let report = renewal.renew_all().await.unwrap();
    assert_eq!(report.gmail.success, 2);
    assert_eq!(report.gmail.failed, 1);
    assert_eq!(report.gmail.errors.len(), 1);
    assert_eq!(report.gmail.errors[0].connection_id, ids[1]);
    assert_eq!(report.outlook.attempted(), 0);
    assert_eq!(capture.count(&Method::POST, "/gmail/v1/users/me/watch"), 3);

    let renewed = db.get_connection(ids[2]).await.unwrap().unwrap();
    assert_eq!(
        renewed.webhook_expiry.map(|e| e.timestamp_millis()),
        Some(WATCH_EXPIRATION_MS)
    );
    let failed = db.get_connection(ids[1]).await.unwrap().unwrap();
    assert_eq!(failed.webhook_expiry, Some(expiry));

    cleanup(&path);
}

#[tokio::test]
async fn outlook_patch_failure_creates_new_subscription() {
    let (renewal, db, capture, path) = build("renew-outlook").await;

    let conn = seed_connection(&db, "u", ProviderKind::Outlook, "rep@contoso.com", "graph-token").await;
    set_webhook(&db, conn.id, Some("sub-old"), Utc::now() + Duration::hours(6)).await;

    let report = renewal.renew_all().await.unwrap();
    assert_eq!(report.outlook.success, 1);
    assert_eq!(report.outlook.failed, 0);

    assert_eq!(
        capture.count(&Method::PATCH, "/graph/v1.0/subscriptions/sub-old"),
        1
    );
    assert_eq!(capture.count(&Method::POST, "/graph/v1.0/subscriptions"), 1);

    let updated = db.get_connection(conn.id).await.unwrap().unwrap();
    assert_eq!(updated.webhook_subscription_id.as_deref(), Some("sub-new"));
    assert_eq!(
        updated.webhook_expiry.map(|e| e.to_rfc3339()),
        Some("2030-01-03T00:00:00+00:00".to_string())
    );

    // The new subscription carries the configured notification URL and client state.
    let reqs = capture.reqs.lock().unwrap();
    let create = reqs
        .iter()
        .find(|r| r.method == Method::POST && r.path == "/graph/v1.0/subscriptions")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();
    assert_eq!(body["notificationUrl"], "https://crm.test/api/webhooks/outlook");
    assert_eq!(body["clientState"], "client-state");
    assert_eq!(body["changeType"], "created");
    drop(reqs);

    cleanup(&path);
}

#[tokio::test]
async fn status_reports_expiry_and_renewal_need() {
    let (renewal, db, _capture, path) = build("renew-status").await;

    let conn = seed_connection(&db, "owner", ProviderKind::Outlook, "rep@contoso.com", "t").await;
    set_webhook(&db, conn.id, Some("sub-1"), Utc::now() + Duration::hours(10)).await;
    seed_connection(&db, "someone-else", ProviderKind::Gmail, "x@acme.io", "t").await;

    let status = renewal.status("owner").await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].connection_id, conn.id);
    assert!(status[0].needs_renewal);
    assert_eq!(status[0].webhook_subscription_id.as_deref(), Some("sub-1"));
    assert!(matches!(status[0].expires_in_hours, Some(9 | 10)));

    cleanup(&path);
}

async fn seed_due_gmail_with_expired_token(
    db: &DbActorHandle,
    mailbox: &str,
    access_token: &str,
) -> i64 {
    let conn = seed_connection(db, "u", ProviderKind::Gmail, mailbox, access_token).await;
    set_webhook(db, conn.id, None, Utc::now() + Duration::hours(12)).await;
    db.patch_connection(
        conn.id,
        ConnectionPatch::tokens(
            access_token.to_string(),
            None,
            Some(Utc::now() - Duration::minutes(1)),
        ),
    )
    .await
    .unwrap();
    conn.id
}

#[tokio::test]
async fn revoked_refresh_token_fails_without_retry_and_is_named() {
    let (renewal, db, capture, path) = build("renew-revoked").await;
    let id = seed_due_gmail_with_expired_token(&db, "gone@acme.io", "revoked").await;

    let report = renewal.renew_all().await.unwrap();
    assert_eq!(report.gmail.failed, 1);
    assert_eq!(report.gmail.errors[0].connection_id, id);
    assert!(report.gmail.errors[0].message.contains("invalid_grant"));
    assert!(report.gmail.errors[0].message.contains("reconnect required"));

    assert_eq!(capture.count(&Method::POST, "/google/token"), 1);
    assert_eq!(capture.count(&Method::POST, "/gmail/v1/users/me/watch"), 0);

    cleanup(&path);
}

#[tokio::test]
async fn unreadable_token_response_is_not_retried() {
    let (renewal, db, capture, path) = build("renew-garbled").await;
    seed_due_gmail_with_expired_token(&db, "odd@acme.io", "garbled").await;

    let report = renewal.renew_all().await.unwrap();
    assert_eq!(report.gmail.failed, 1);
    assert!(report.gmail.errors[0].message.contains("unreadable body"));
    assert_eq!(capture.count(&Method::POST, "/google/token"), 1);

    cleanup(&path);
}

#[tokio::test]
async fn expired_token_is_refreshed_before_watch() {
    let (renewal, db, capture, path) = build("renew-refresh").await;
    let id = seed_due_gmail_with_expired_token(&db, "rep@acme.io", "stale").await;

    let report = renewal.renew_all().await.unwrap();
    assert_eq!(report.gmail.success, 1);
    assert_eq!(capture.count(&Method::POST, "/google/token"), 1);

    let reqs = capture.reqs.lock().unwrap();
    let watch = reqs
        .iter()
        .find(|r| r.path == "/gmail/v1/users/me/watch")
        .unwrap();
    assert_eq!(watch.headers.get(header::AUTHORIZATION).unwrap(), "Bearer fresh-at");
    drop(reqs);
    assert_eq!(db.get_connection(id).await.unwrap().unwrap().access_token, "fresh-at");

    cleanup(&path);
}

#[tokio::test]
async fn renewal_pass_is_bounded_by_deadline() {
    let (renewal, db, _capture, path) = build("renew-deadline").await;
    let conn = seed_connection(&db, "u", ProviderKind::Gmail, "slow@acme.io", "slow-token").await;
    set_webhook(&db, conn.id, None, Utc::now() + Duration::hours(12)).await;

    let err = renewal
        .renew_all_within(std::time::Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");

    cleanup(&path);
}

#[tokio::test]
async fn disabled_renewal_is_rejected() {
    let (renewal, db, capture, path) =
        build_with("renew-disabled", |cfg| cfg.enable_webhook_renewal = false).await;
    let conn = seed_connection(&db, "u", ProviderKind::Gmail, "rep@acme.io", "t").await;
    set_webhook(&db, conn.id, None, Utc::now() + Duration::hours(12)).await;

    let err = renewal.renew_all().await.unwrap_err();
    assert_eq!(err.code(), "BAD_REQUEST");
    assert!(capture.reqs.lock().unwrap().is_empty());

    cleanup(&path);
}
