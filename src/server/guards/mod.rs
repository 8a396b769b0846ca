pub mod auth;

pub use auth::{AuthError, CurrentUser, RequireKeyAuth};
