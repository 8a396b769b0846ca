#![allow(dead_code)]

use axum::{
    Router,
    http::{HeaderMap, Method},
};
use chrono::{DateTime, Utc};
use crmsync::config::Config;
use crmsync::db::{ConnectionCreate, ConnectionPatch, DbActorHandle, DbEmailConnection, ProviderKind};
use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use url::Url;

pub const API_KEY: &str = "test-session-secret";

#[derive(Clone, Default)]
pub struct CaptureState {
    pub reqs: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureState {
    pub fn push(&self, method: Method, path: &str, headers: HeaderMap, body: &[u8]) {
        self.reqs.lock().unwrap().push(Captured {
            method,
            path: path.to_string(),
            headers,
            body: body.to_vec(),
        });
    }

    pub fn count(&self, method: &Method, path_prefix: &str) -> usize {
        self.reqs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == *method && c.path.starts_with(path_prefix))
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub fn unique_sqlite_path(prefix: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "crmsync-{prefix}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    temp_path
}

pub async fn spawn_db(prefix: &str) -> (DbActorHandle, std::path::PathBuf) {
    let path = unique_sqlite_path(prefix);
    let database_url = format!("sqlite:{}", path.display());
    let db = crmsync::db::spawn(&database_url)
        .await
        .expect("spawn db actor");
    (db, path)
}

pub fn cleanup(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("sqlite-wal"));
    let _ = std::fs::remove_file(path.with_extension("sqlite-shm"));
}

pub async fn spawn_test_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{addr}")).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

/// Config with both providers enabled, all upstream URLs pointing at `upstream`
/// and a near-zero retry backoff.
pub fn test_config(upstream: &Url) -> Config {
    let mut cfg = Config::default();
    cfg.database_url = "sqlite::memory:".to_string();
    cfg.session_secret = API_KEY.to_string();
    cfg.insecure_cookie = true;

    cfg.gmail_client_id = Some("gmail-client".to_string());
    cfg.gmail_client_secret = Some("gmail-secret".to_string());
    cfg.google_pubsub_topic = Some("projects/crm-test/topics/gmail".to_string());
    cfg.gmail_api_url = upstream.join("gmail/v1/").unwrap();
    cfg.google_calendar_api_url = upstream.join("calendar/v3/").unwrap();
    cfg.google_auth_url = upstream.join("google/auth").unwrap();
    cfg.google_token_url = upstream.join("google/token").unwrap();

    cfg.outlook_client_id = Some("outlook-client".to_string());
    cfg.outlook_client_secret = Some("outlook-secret".to_string());
    cfg.outlook_webhook_url = Some(Url::parse("https://crm.test/api/webhooks/outlook").unwrap());
    cfg.outlook_client_state = Some("client-state".to_string());
    cfg.graph_api_url = upstream.join("graph/v1.0/").unwrap();
    cfg.microsoft_login_url = upstream.join("login/").unwrap();

    cfg.webhook_timeout_ms = 5_000;
    cfg.retry_base_delay_ms = 1;
    cfg
}

pub async fn seed_connection(
    db: &DbActorHandle,
    user_id: &str,
    provider: ProviderKind,
    email: &str,
    access_token: &str,
) -> DbEmailConnection {
    db.upsert_connection(ConnectionCreate {
        user_id: user_id.to_string(),
        provider,
        email_address: email.to_string(),
        access_token: access_token.to_string(),
        refresh_token: Some(format!("rt-{access_token}")),
        token_expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        scope: None,
    })
    .await
    .expect("seed connection")
}

pub async fn set_webhook(
    db: &DbActorHandle,
    id: i64,
    subscription_id: Option<&str>,
    expiry: DateTime<Utc>,
) {
    db.patch_connection(
        id,
        ConnectionPatch::webhook(subscription_id.map(str::to_string), expiry),
    )
    .await
    .expect("patch webhook");
}
