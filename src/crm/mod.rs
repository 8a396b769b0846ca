//! CRM side of the sync: resolve addresses to records, turn mail and meetings into activities.

pub mod materializer;
pub mod matcher;

pub use materializer::{ActivityMaterializer, Materialized, duration_minutes, truncate_notes};
pub use matcher::{CrmMatch, CrmMatcher};
