//! Authenticated request pipeline.
//! Keep the public surface thin and split implementation across sub-modules.

mod client;
mod coordinator;

pub use client::AuthenticatedClient;
pub use coordinator::{
    HttpRefreshBackend, RefreshBackend, RefreshCoordinator, RefreshGrant, RefreshPhase, SessionEvent,
};
