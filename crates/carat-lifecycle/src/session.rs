//! Session identity, state tags and per-session locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{LifecycleError, Result};

/// Identifier of one game on the server ("game number").
///
/// Trimmed, non-empty, ASCII alphanumeric. Channel and role names embed it
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionNumber(String);

impl SessionNumber {
    /// Validate and wrap a session number.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LifecycleError::InvalidSessionNumber(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionNumber {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionNumber {
    type Error = LifecycleError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionNumber> for String {
    fn from(value: SessionNumber) -> Self {
        value.0
    }
}

/// Lifecycle state of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Game in progress, kibitz hidden from the public.
    Running,
    /// Kibitz visible to the public while the game is still on.
    KibitzOpen,
    /// Game over: roles stripped, kibitz open, feedback requested.
    Ended,
    /// Game channel retired into the archive.
    Archived,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::KibitzOpen => write!(f, "kibitz-open"),
            Self::Ended => write!(f, "ended"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Cached lifecycle information for one session number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub state: SessionState,
    /// Number of times the session's channel slot has been recycled.
    pub generation: u64,
}

impl SessionRecord {
    /// A fresh record in `state`.
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            generation: 0,
        }
    }
}

/// Session records plus one async mutex per session number.
///
/// A composite transition holds its session's guard end to end, so two
/// overlapping invocations on the same game run one after the other.
#[derive(Debug, Default)]
pub struct SessionTable {
    locks: Mutex<HashMap<SessionNumber, Arc<Mutex<()>>>>,
    records: Mutex<HashMap<SessionNumber, SessionRecord>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive guard for a session.
    pub async fn lock(&self, session: &SessionNumber) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(session.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Cached record, if the session has been seen.
    pub async fn record(&self, session: &SessionNumber) -> Option<SessionRecord> {
        self.records.lock().await.get(session).copied()
    }

    /// Replace the cached record.
    pub async fn set(&self, session: &SessionNumber, record: SessionRecord) {
        self.records.lock().await.insert(session.clone(), record);
    }

    /// All cached records.
    pub async fn records(&self) -> Vec<(SessionNumber, SessionRecord)> {
        let mut all: Vec<_> = self
            .records
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
