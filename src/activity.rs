//! Activity log: the companion store tracking what the user is doing now.
//!
//! Entries carry a free-text value plus start/stop/deadline timestamps. The
//! *active* activity is the most recent entry without a stop time. The log
//! is persisted as its own JSON document next to the graph document.
//!
//! Loading is deliberately forgiving: a missing or unparseable document
//! falls back to an empty log (with a warning) instead of failing startup —
//! losing the activity history must never block access to the task graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::NodeId;
use crate::persist::{ACTIVITY_STATE_KEY, KvStore, StoreResult};

/// One tracked activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Append-ordered log of activities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub entries: Vec<Activity>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new activity now and return its id.
    pub fn begin(&mut self, value: impl Into<String>) -> String {
        let id = NodeId::fresh().to_string();
        self.entries.push(Activity {
            id: id.clone(),
            value: Some(value.into()),
            start: Some(Utc::now()),
            stop: None,
            deadline: None,
        });
        id
    }

    /// Stop the active activity, if there is one. Returns whether anything
    /// was stopped.
    pub fn finish(&mut self) -> bool {
        match self.entries.last_mut() {
            Some(last) if last.stop.is_none() => {
                last.stop = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// The most recent entry, if it has not been stopped.
    pub fn active(&self) -> Option<&Activity> {
        self.entries.last().filter(|entry| entry.stop.is_none())
    }
}

/// Load the activity log; missing or malformed documents fall back to empty.
pub fn load_activity(kv: &dyn KvStore) -> StoreResult<ActivityLog> {
    let Some(bytes) = kv.get(ACTIVITY_STATE_KEY)? else {
        return Ok(ActivityLog::new());
    };
    match serde_json::from_slice(&bytes) {
        Ok(log) => Ok(log),
        Err(e) => {
            tracing::warn!(error = %e, "activity log unreadable, starting empty");
            Ok(ActivityLog::new())
        }
    }
}

/// Persist the activity log under its fixed key.
pub fn save_activity(kv: &dyn KvStore, log: &ActivityLog) -> StoreResult<()> {
    let bytes = serde_json::to_vec(log).map_err(|e| crate::error::StoreError::Serialization {
        message: format!("failed to encode activity log: {e}"),
    })?;
    kv.put(ACTIVITY_STATE_KEY, &bytes)
}
