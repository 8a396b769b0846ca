//! Cron-driven background jobs: webhook renewal, heartbeat, idempotency cleanup.
//!
//! The scheduler is one owned object. `shutdown()` cancels the shared token first, so a
//! job that fires while the process is stopping skips its body, then stops the cron
//! runner itself.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::idempotency::IdempotencyGuard;
use crate::renewal::RenewalService;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub renewal_cron: String,
    pub health_check_cron: String,
    pub idempotency_cleanup_cron: String,
    pub enable_webhook_renewal: bool,
    pub renewal_job_timeout: Duration,
    pub idempotency_retention: chrono::Duration,
}

impl SchedulerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        let settings = cfg.sync_settings();
        Self {
            renewal_cron: cfg.renewal_cron.clone(),
            health_check_cron: cfg.health_check_cron.clone(),
            idempotency_cleanup_cron: cfg.idempotency_cleanup_cron.clone(),
            enable_webhook_renewal: settings.enable_webhook_renewal,
            renewal_job_timeout: settings.renewal_job_timeout,
            idempotency_retention: settings.idempotency_retention,
        }
    }
}

pub struct SyncScheduler {
    config: SchedulerConfig,
    scheduler: Option<JobScheduler>,
    cancellation: CancellationToken,
    renewal: RenewalService,
    idempotency: IdempotencyGuard,
}

impl SyncScheduler {
    pub fn new(
        config: SchedulerConfig,
        renewal: RenewalService,
        idempotency: IdempotencyGuard,
    ) -> Self {
        Self {
            config,
            scheduler: None,
            cancellation: CancellationToken::new(),
            renewal,
            idempotency,
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Token cancelled by [`SyncScheduler::shutdown`].
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn start(&mut self) -> Result<(), SyncError> {
        if self.is_running() {
            return Err(SyncError::UnexpectedError(
                "scheduler already running".to_string(),
            ));
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| scheduler_error("create scheduler", e))?;

        if self.config.enable_webhook_renewal {
            let renewal = self.renewal.clone();
            let timeout = self.config.renewal_job_timeout;
            self.add_job(&scheduler, "webhook_renewal", &self.config.renewal_cron, move || {
                let renewal = renewal.clone();
                async move { run_renewal(renewal, timeout).await }
            })
            .await?;
        } else {
            info!("webhook renewal disabled, renewal job not scheduled");
        }

        self.add_job(&scheduler, "health_check", &self.config.health_check_cron, || async {
            info!(at = %chrono::Utc::now(), "scheduler heartbeat");
        })
        .await?;

        let idempotency = self.idempotency.clone();
        let retention = self.config.idempotency_retention;
        self.add_job(
            &scheduler,
            "idempotency_cleanup",
            &self.config.idempotency_cleanup_cron,
            move || {
                let idempotency = idempotency.clone();
                async move {
                    if let Err(e) = idempotency.cleanup_old_events(retention).await {
                        error!(error = %e, "processed event cleanup failed");
                    }
                }
            },
        )
        .await?;

        scheduler
            .start()
            .await
            .map_err(|e| scheduler_error("start scheduler", e))?;
        self.scheduler = Some(scheduler);
        info!(
            renewal_cron = %self.config.renewal_cron,
            health_check_cron = %self.config.health_check_cron,
            idempotency_cleanup_cron = %self.config.idempotency_cleanup_cron,
            "sync scheduler started"
        );
        Ok(())
    }

    async fn add_job<F, Fut>(
        &self,
        scheduler: &JobScheduler,
        name: &'static str,
        cron: &str,
        body: F,
    ) -> Result<(), SyncError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancellation.clone();
        let body = std::sync::Arc::new(body);

        let job = Job::new_async(cron, move |_id, _lock| {
            let cancel = cancel.clone();
            let body = body.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    debug!(job = name, "shutting down, scheduled run skipped");
                    return;
                }
                let started = Instant::now();
                body().await;
                debug!(job = name, elapsed = ?started.elapsed(), "scheduled run finished");
            })
        })
        .map_err(|e| scheduler_error(name, e))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| scheduler_error(name, e))?;
        debug!(job = name, cron, "job registered");
        Ok(())
    }

    /// Sets the shutdown flag, then stops every registered job.
    pub async fn shutdown(&mut self) -> Result<(), SyncError> {
        self.cancellation.cancel();

        let Some(mut scheduler) = self.scheduler.take() else {
            return Ok(());
        };
        scheduler
            .shutdown()
            .await
            .map_err(|e| scheduler_error("shutdown scheduler", e))?;
        info!("sync scheduler stopped");
        Ok(())
    }
}

async fn run_renewal(renewal: RenewalService, timeout: Duration) {
    match renewal.renew_all_within(timeout).await {
        Ok(report) => {
            if report.total_failed() > 0 {
                warn!(
                    gmail_failed = report.gmail.failed,
                    outlook_failed = report.outlook.failed,
                    errors = ?report.gmail.errors.iter().chain(&report.outlook.errors).collect::<Vec<_>>(),
                    "webhook renewal finished with failures"
                );
            }
        }
        Err(e @ SyncError::Timeout(_)) => warn!(error = %e, "webhook renewal timed out"),
        Err(e) => error!(error = %e, "webhook renewal aborted"),
    }
}

fn scheduler_error(context: &str, e: impl std::fmt::Display) -> SyncError {
    SyncError::UnexpectedError(format!("{context}: {e}"))
}
