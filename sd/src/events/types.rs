//! Event types published on the external event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted by a heartbeat source on every fire
pub const HEARTBEAT_TICK: &str = "heartbeat:tick";

/// Emitted by the dispatcher when a busy agent's queue drains
pub const IDLE: &str = "idle";

/// Event name published by a cron source before it produces a task
pub fn cron_event_name(pattern: &str) -> String {
    format!("cron:{pattern}")
}

/// Who emitted an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerMeta {
    pub caller_type: String,
    pub caller_id: String,
}

impl CallerMeta {
    /// Caller metadata for an internal scheduler component
    pub fn system(caller_id: impl Into<String>) -> Self {
        Self {
            caller_type: "system".to_string(),
            caller_id: caller_id.into(),
        }
    }
}

/// A notification delivered to event bus subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusEvent {
    pub event_name: String,
    pub caller: CallerMeta,
    pub agent_name: String,
    pub payload: Value,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(event_name: impl Into<String>, caller: CallerMeta, agent_name: impl Into<String>, payload: Value) -> Self {
        Self {
            event_name: event_name.into(),
            caller,
            agent_name: agent_name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}
