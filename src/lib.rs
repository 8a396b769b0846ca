pub mod config;
pub mod crm;
pub mod db;
pub mod error;
pub mod idempotency;
pub(crate) mod oauth_utils;
pub mod providers;
pub mod renewal;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod utils;

pub use config::Config;
pub use error::SyncError;
