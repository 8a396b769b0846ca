mod common;

use common::{cleanup, spawn_db, test_config};
use crmsync::idempotency::IdempotencyGuard;
use crmsync::providers::Providers;
use crmsync::renewal::RenewalService;
use crmsync::scheduler::{SchedulerConfig, SyncScheduler};
use url::Url;

async fn build_scheduler(prefix: &str, renewal_cron: &str) -> (SyncScheduler, std::path::PathBuf) {
    let cfg = test_config(&Url::parse("http://127.0.0.1:9/").unwrap());
    let (db, path) = spawn_db(prefix).await;
    let providers = Providers::from_config(&cfg).expect("providers");

    let mut config = SchedulerConfig::from_config(&cfg);
    config.renewal_cron = renewal_cron.to_string();

    let scheduler = SyncScheduler::new(
        config,
        RenewalService::new(db.clone(), providers),
        IdempotencyGuard::new(db),
    );
    (scheduler, path)
}

#[tokio::test]
async fn start_and_shutdown_cancel_the_scheduler() {
    let (mut scheduler, path) = build_scheduler("sched-lifecycle", "0 0 2 * * *").await;
    let cancel = scheduler.cancellation();

    scheduler.start().await.expect("scheduler starts");
    assert!(scheduler.is_running());
    assert!(scheduler.start().await.is_err());

    scheduler.shutdown().await.expect("scheduler stops");
    assert!(!scheduler.is_running());
    assert!(cancel.is_cancelled());

    // Idempotent once stopped.
    scheduler.shutdown().await.expect("second shutdown is a no-op");

    cleanup(&path);
}

#[tokio::test]
async fn invalid_cron_expression_fails_start() {
    let (mut scheduler, path) = build_scheduler("sched-cron", "not a cron").await;

    let err = scheduler.start().await.unwrap_err();
    assert!(err.to_string().contains("webhook_renewal"));
    assert!(!scheduler.is_running());

    cleanup(&path);
}
