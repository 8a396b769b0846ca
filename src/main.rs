use crmsync::config::Config;
use crmsync::scheduler::{SchedulerConfig, SyncScheduler};
use crmsync::server::{AppState, crmsync_router};
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        listen_addr = %cfg.listen_addr,
        listen_port = cfg.listen_port,
        enable_email_sync = cfg.enable_email_sync,
        enable_webhook_renewal = cfg.enable_webhook_renewal,
    );

    let db = crmsync::db::spawn(&cfg.database_url).await?;
    let providers = crmsync::providers::Providers::from_config(&cfg)?;

    let state = AppState::new(
        db.clone(),
        providers,
        Arc::from(cfg.session_secret.as_str()),
        cfg.insecure_cookie,
    );

    let mut scheduler = SyncScheduler::new(
        SchedulerConfig::from_config(&cfg),
        state.renewal.clone(),
        state.idempotency.clone(),
    );
    scheduler.start().await?;

    let app = crmsync_router(state);

    let addr = SocketAddr::from((cfg.listen_addr, cfg.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    // Scheduled jobs stop before the listener is released; the database closes last.
    let shutdown = async move {
        shutdown_signal().await;
        if let Err(e) = scheduler.shutdown().await {
            error!(error = %e, "scheduler shutdown failed");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if let Err(e) = db.stop().await {
        error!(error = %e, "database actor shutdown failed");
    }
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
