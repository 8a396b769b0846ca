use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::SyncSettings;
use crate::db::ProviderKind;
use crate::error::{IsRetryable, SyncError};

/// Attempt count and backoff for one upstream call: `attempts` total tries,
/// waiting `base_delay`, then twice that, and so on between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.retry_attempts, settings.retry_base_delay)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(2.0)
            .with_max_delay(self.base_delay.saturating_mul(64))
            .with_max_times(self.attempts - 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `op` under `policy`, retrying only errors that report themselves retryable.
pub(crate) async fn with_retry<T, F, Fut>(
    provider: ProviderKind,
    operation: &'static str,
    policy: RetryPolicy,
    op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    op.retry(policy.backoff())
        .when(|e: &SyncError| e.is_retryable())
        .notify(|err: &SyncError, dur: Duration| {
            warn!(
                %provider,
                operation,
                error = %err,
                "upstream call failed, retrying in {:?}",
                dur
            );
        })
        .await
}
