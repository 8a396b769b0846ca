//! Persistent storage: SQLite behind a single `ractor` actor.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and insert payloads
//! - `patch.rs`: partial connection updates
//! - `schema.rs`: SQL DDL applied at actor start
//! - `actor.rs`: the actor, its messages and the cloneable handle

pub mod actor;
pub mod models;
pub mod patch;
pub mod schema;

pub use actor::{DbActorHandle, spawn};
pub use models::{
    ActivityCreate, ConnectionCreate, ContactCreate, DbActivity, DbContact, DbEmailConnection,
    DbLead, LeadCreate, ProviderKind,
};
pub use patch::ConnectionPatch;
pub use schema::SQLITE_INIT;
