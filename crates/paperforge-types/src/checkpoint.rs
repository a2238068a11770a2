//! Checkpoint and agent-action log entry types.
//!
//! One `NodeCheckpoint` is emitted per node completion or failure and carries
//! a full snapshot of the task record; `AgentActionLog` entries record the
//! token/cost accounting of individual node actions. Both are persisted by a
//! `CheckpointRecorder` implementation on a best-effort basis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::research::{ResearchState, TaskStatus};

/// A persisted snapshot of the task record at one point in execution.
///
/// Keyed by `(task_id, seq)`; `seq` is the engine's node invocation counter,
/// so the sequence of checkpoints for a task totally orders its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCheckpoint {
    pub task_id: Uuid,
    pub node: String,
    pub seq: u32,
    pub status_before: TaskStatus,
    pub status_after: TaskStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub snapshot: ResearchState,
    pub recorded_at: DateTime<Utc>,
}

/// Accounting record for one node action against the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActionLog {
    pub task_id: Uuid,
    pub node: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    /// First ~200 chars of the prompt, for audit trails.
    pub input_summary: String,
    /// First ~200 chars of the output.
    pub output_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Errors from checkpoint persistence.
///
/// Recorder failures are logged and swallowed by the executor -- they never
/// fail the workflow.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("checkpoint storage error: {0}")]
    Storage(String),

    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_serde_roundtrip() {
        let state = ResearchState::new(Uuid::now_v7(), "dark matter surveys", "");
        let cp = NodeCheckpoint {
            task_id: state.task_id,
            node: "planner".to_string(),
            seq: 1,
            status_before: TaskStatus::Running,
            status_after: TaskStatus::Running,
            duration_ms: 1200,
            error: None,
            snapshot: state,
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let parsed: NodeCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node, "planner");
        assert_eq!(parsed.seq, 1);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_recorder_error_display() {
        let err = RecorderError::Storage("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }
}
