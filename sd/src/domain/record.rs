//! Execution records - the outcome of one executed task

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Task;

/// Status of an execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one task execution
///
/// Created in `Running` state when the dispatcher starts a task and finalized
/// exactly once through [`complete`](Self::complete) or [`fail`](Self::fail).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub task_id: String,
    pub agent_name: String,
    pub prompt: String,
    pub source: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Open a running record for a task that is about to execute
    pub fn started(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            agent_name: task.agent_name.clone(),
            prompt: task.prompt.clone(),
            source: task.source.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
        }
    }

    /// Finalize as completed with the agent's response
    pub fn complete(mut self, result: String) -> Self {
        self.finish(ExecutionStatus::Completed);
        self.result = Some(result);
        self
    }

    /// Finalize as failed with the stringified error
    pub fn fail(mut self, error: String) -> Self {
        self.finish(ExecutionStatus::Failed);
        self.error = Some(error);
        self
    }

    fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}
