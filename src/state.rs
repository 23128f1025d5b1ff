//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to every socket task. It owns the four in-process registries
//! (connections, rooms, presence, call sessions) and the external seams
//! (identity, membership, durable stores) as trait objects, so the same
//! router runs against Postgres in production and the in-memory store in
//! tests.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::services::call::CallSignaling;
use crate::services::identity::IdentityVerifier;
use crate::services::presence::PresenceTracker;
use crate::services::registry::ConnectionRegistry;
use crate::services::room::RoomBroadcaster;
use crate::store::{BoardStore, DocumentStore, MembershipOracle, MessageStore};

/// External collaborators the gateway talks to.
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentityVerifier>,
    pub membership: Arc<dyn MembershipOracle>,
    pub messages: Arc<dyn MessageStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub board: Arc<dyn BoardStore>,
}

/// Clone is required by Axum; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomBroadcaster>,
    pub presence: Arc<PresenceTracker>,
    pub calls: Arc<CallSignaling>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub membership: Arc<dyn MembershipOracle>,
    pub messages: Arc<dyn MessageStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub board: Arc<dyn BoardStore>,
}

impl AppState {
    #[must_use]
    pub fn new(config: GatewayConfig, backends: Backends) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomBroadcaster::new()),
            presence: Arc::new(PresenceTracker::new()),
            calls: Arc::new(CallSignaling::new()),
            identity: backends.identity,
            membership: backends.membership,
            messages: backends.messages,
            documents: backends.documents,
            board: backends.board,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
