//! HTTP surface of the relay.

pub mod protocol;
mod router;
mod state;

pub use router::build_router;
pub use state::AppState;
