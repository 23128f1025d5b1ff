//! Call signaling state machine.
//!
//! DESIGN
//! ======
//! State is tracked per (workspace, connection) and defaults to `Idle` for
//! any key never seen. The gateway only relays signaling; media flows
//! peer-to-peer, so the state here is advisory and never blocks a relay.
//!
//! ```text
//!   idle ──calling──▶ ringing ──answer──▶ answered
//!     ▲                  │  ───reject──▶ rejected
//!     │                  └───end─────▶ ended
//!     └── terminal states behave as idle for the next call
//! ```
//!
//! `answer`, `reject` and `end` are accepted from any state. Repeated
//! `user_calling` is damped by the registry's per-connection debounce, not
//! here.
//!
//! Each entry tracks only its own connection's side of a call. A responder's
//! `answer`, `reject` or `end` moves the responder's entry; the caller's entry
//! stays `Ringing` until the caller sends its own `end_call` or its next
//! `user_calling`. Peers are addressed by user id while entries are keyed by
//! connection, so there is no caller entry to resolve from a reply.

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Ringing,
    Answered,
    Rejected,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Calling,
    Answer,
    Reject,
    End,
}

impl CallEvent {
    /// Outbound syscall used when relaying this event to the room.
    #[must_use]
    pub fn outbound_syscall(self) -> &'static str {
        match self {
            Self::Calling => "user_calling",
            Self::Answer => "call_answered",
            Self::Reject => "call_rejected",
            Self::End => "call_ended",
        }
    }
}

impl CallState {
    #[must_use]
    pub fn apply(self, event: CallEvent) -> Self {
        match event {
            CallEvent::Calling => Self::Ringing,
            CallEvent::Answer => Self::Answered,
            CallEvent::Reject => Self::Rejected,
            CallEvent::End => Self::Ended,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Answered | Self::Rejected | Self::Ended)
    }
}

#[derive(Default)]
pub struct CallSignaling {
    sessions: DashMap<(Uuid, Uuid), CallState>,
}

impl CallSignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self, workspace_id: Uuid, connection_id: Uuid) -> CallState {
        self.sessions
            .get(&(workspace_id, connection_id))
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Advance the session and return the new state.
    pub fn apply(&self, workspace_id: Uuid, connection_id: Uuid, event: CallEvent) -> CallState {
        let mut entry = self.sessions.entry((workspace_id, connection_id)).or_default();
        let from = *entry;
        let to = from.apply(event);
        *entry = to;
        tracing::debug!(%workspace_id, %connection_id, ?from, ?to, terminal = to.is_terminal(), "call: transition");
        to
    }

    /// Forget every session owned by a connection.
    pub fn clear_connection(&self, connection_id: Uuid) {
        self.sessions.retain(|(_, owner), _| *owner != connection_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
#[path = "call_test.rs"]
mod tests;
