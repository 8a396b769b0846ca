pub mod guards;
pub mod router;
pub mod routes;

pub use router::{AppState, crmsync_router};
