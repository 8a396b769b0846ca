mod service;

pub use service::{SyncService, SyncSummary};
