//! Presence tracker: coarse online/offline/away per user.
//!
//! DESIGN
//! ======
//! Records are keyed by user, not by connection, and live for the life of
//! the process (no TTL, no sweep). Every update stamps `last_seen`.
//!
//! TRADE-OFFS
//! ==========
//! Presence is process-global. Updates are broadcast to every live
//! connection and the workspace snapshot returns every known record, whether
//! or not the user belongs to that workspace.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::frame::{Data, Frame, to_data};

pub const PRESENCE_UPDATE: &str = "presence_update";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Away => "away",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown presence status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PresenceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "away" => Ok(Self::Away),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl PresenceRecord {
    /// Outbound `presence_update` frame for this record.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::request(PRESENCE_UPDATE, to_data(self))
    }
}

#[derive(Default)]
pub struct PresenceTracker {
    records: DashMap<Uuid, PresenceRecord>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the user's status and stamp `last_seen = now`.
    pub fn set_status(&self, user_id: Uuid, status: PresenceStatus) -> PresenceRecord {
        let record = PresenceRecord { user_id, status, last_seen: OffsetDateTime::now_utc() };
        self.records.insert(user_id, record.clone());
        record
    }

    #[must_use]
    pub fn get(&self, user_id: Uuid) -> Option<PresenceRecord> {
        self.records.get(&user_id).map(|r| r.clone())
    }

    /// Every known record, ordered by user id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.user_id);
        records
    }
}

/// Snapshot wrapped for an HTTP or frame payload.
#[must_use]
pub fn snapshot_data(tracker: &PresenceTracker) -> Data {
    let mut data = Data::new();
    data.insert("presence".into(), serde_json::to_value(tracker.snapshot()).unwrap_or_default());
    data
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
