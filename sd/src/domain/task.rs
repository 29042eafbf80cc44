//! Task - one prompt submission destined for exactly one agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Priority;

/// Free-form metadata attached by the producing input source
pub type TaskMetadata = serde_json::Map<String, serde_json::Value>;

/// A unit of work queued for an agent
///
/// Tasks are immutable once created. The `source` tag records provenance,
/// e.g. `heartbeat:<id>`, `cron:<id>`, `hook:<event>` or `manual`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub agent_name: String,
    pub prompt: String,
    pub priority: Priority,
    pub source: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,
}

impl Task {
    /// Create a task with a fresh id and the current timestamp
    pub fn new(
        agent_name: impl Into<String>,
        prompt: impl Into<String>,
        priority: Priority,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            priority,
            source: source.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new("agent", "p", Priority::Normal, "manual");
        let b = Task::new("agent", "p", Priority::Normal, "manual");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = Task::new("agent-a", "hello", Priority::High, "manual");
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["agentName"], "agent-a");
        assert_eq!(json["priority"], "high");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("metadata").is_none());
    }
}
