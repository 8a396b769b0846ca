//! Proactive renewal of Gmail watches and Graph subscriptions.

mod report;
mod service;

pub use report::{ConnectionFailure, ProviderRenewalResult, RenewalReport, WebhookStatus};
pub use service::{
    GMAIL_RENEWAL_THRESHOLD_DAYS, OUTLOOK_RENEWAL_THRESHOLD_DAYS, RenewalService,
};
