//! Connection registry: every live socket and its per-connection state.
//!
//! DESIGN
//! ======
//! One entry per transport session, keyed by a v4 connection id. The entry
//! carries the identity fixed at handshake, the rooms the connection has
//! joined, the instant of its last accepted `user_calling`, and the active
//! signaling peer per workspace. Nothing outside this module touches the
//! map directly.
//!
//! TEARDOWN
//! ========
//! `begin_teardown` marks the entry closing and hands back a snapshot of its
//! rooms and peers. Only the first caller gets the snapshot, so cleanup runs
//! exactly once even if the socket loop and an error path both try. The
//! entry itself is removed last, after peers have been notified.
//!
//! LOCKING
//! =======
//! `DashMap` shard guards are never held across an `.await` and never held
//! while sending: senders are cloned out first, then `try_send` runs unlocked.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::frame::Frame;

struct Connection {
    user_id: Uuid,
    tx: mpsc::Sender<Frame>,
    rooms: HashSet<Uuid>,
    last_call_at: Option<Instant>,
    /// workspace id -> signaling peer id
    active_peers: HashMap<Uuid, String>,
    closing: bool,
}

/// State captured at the start of teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub user_id: Uuid,
    pub rooms: Vec<Uuid>,
    pub active_peers: Vec<(Uuid, String)>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: Uuid, user_id: Uuid, tx: mpsc::Sender<Frame>) {
        self.connections.insert(
            connection_id,
            Connection {
                user_id,
                tx,
                rooms: HashSet::new(),
                last_call_at: None,
                active_peers: HashMap::new(),
                closing: false,
            },
        );
    }

    #[must_use]
    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.connections.contains_key(&connection_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Outbound channel of a live connection. `None` once teardown has begun.
    #[must_use]
    pub fn sender(&self, connection_id: Uuid) -> Option<mpsc::Sender<Frame>> {
        self.connections
            .get(&connection_id)
            .filter(|c| !c.closing)
            .map(|c| c.tx.clone())
    }

    /// Record that the connection joined a room. Returns false if the
    /// connection is unknown or closing.
    pub fn add_room(&self, connection_id: Uuid, workspace_id: Uuid) -> bool {
        match self.connections.get_mut(&connection_id) {
            Some(mut conn) if !conn.closing => {
                conn.rooms.insert(workspace_id);
                true
            }
            _ => false,
        }
    }

    pub fn remove_room(&self, connection_id: Uuid, workspace_id: Uuid) {
        if let Some(mut conn) = self.connections.get_mut(&connection_id) {
            conn.rooms.remove(&workspace_id);
        }
    }

    #[must_use]
    pub fn rooms(&self, connection_id: Uuid) -> Vec<Uuid> {
        self.connections
            .get(&connection_id)
            .map(|c| c.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Debounce gate for `user_calling`. Accepts and stamps `now` unless the
    /// previous accepted call is younger than `window`. Suppressed calls do
    /// not move the stamp.
    pub fn admit_call(&self, connection_id: Uuid, now: Instant, window: Duration) -> bool {
        let Some(mut conn) = self.connections.get_mut(&connection_id) else {
            return false;
        };
        if let Some(last) = conn.last_call_at {
            if now.saturating_duration_since(last) < window {
                return false;
            }
        }
        conn.last_call_at = Some(now);
        true
    }

    pub fn set_active_peer(&self, connection_id: Uuid, workspace_id: Uuid, peer_id: &str) {
        if let Some(mut conn) = self.connections.get_mut(&connection_id) {
            conn.active_peers.insert(workspace_id, peer_id.to_owned());
        }
    }

    pub fn clear_active_peer(&self, connection_id: Uuid, workspace_id: Uuid) -> Option<String> {
        self.connections
            .get_mut(&connection_id)
            .and_then(|mut conn| conn.active_peers.remove(&workspace_id))
    }

    #[must_use]
    pub fn active_peer(&self, connection_id: Uuid, workspace_id: Uuid) -> Option<String> {
        self.connections
            .get(&connection_id)
            .and_then(|c| c.active_peers.get(&workspace_id).cloned())
    }

    /// Claim the connection for teardown. The first call marks it closing and
    /// drains its rooms and peers; later calls return `None`.
    pub fn begin_teardown(&self, connection_id: Uuid) -> Option<Teardown> {
        let mut conn = self.connections.get_mut(&connection_id)?;
        if conn.closing {
            return None;
        }
        conn.closing = true;
        let mut rooms: Vec<Uuid> = conn.rooms.drain().collect();
        rooms.sort_unstable();
        let mut active_peers: Vec<(Uuid, String)> = conn.active_peers.drain().collect();
        active_peers.sort_unstable();
        Some(Teardown { user_id: conn.user_id, rooms, active_peers })
    }

    pub fn remove(&self, connection_id: Uuid) {
        self.connections.remove(&connection_id);
    }

    /// Best-effort send to every live connection, optionally skipping one.
    /// Returns how many channels accepted the frame.
    pub fn broadcast_all(&self, frame: &Frame, exclude: Option<Uuid>) -> usize {
        let targets: Vec<mpsc::Sender<Frame>> = self
            .connections
            .iter()
            .filter(|entry| !entry.closing && exclude != Some(*entry.key()))
            .map(|entry| entry.tx.clone())
            .collect();

        targets
            .iter()
            .filter(|tx| tx.try_send(frame.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
