//! CheckpointRecorder port and reference recorders.
//!
//! The persistence layer implements `CheckpointRecorder`; the executor calls
//! it after every node completion or failure. Recording is best-effort: the
//! executor logs and swallows recorder errors, so implementations should not
//! bother with internal retries.

use std::sync::Mutex;

use paperforge_types::checkpoint::{AgentActionLog, NodeCheckpoint, RecorderError};

/// Port for persisting execution checkpoints and agent-action accounting.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointRecorder: Send + Sync {
    /// Persist one state snapshot checkpoint.
    fn record_checkpoint(
        &self,
        checkpoint: &NodeCheckpoint,
    ) -> impl std::future::Future<Output = Result<(), RecorderError>> + Send;

    /// Persist one agent-action accounting entry.
    fn record_agent_action(
        &self,
        action: &AgentActionLog,
    ) -> impl std::future::Future<Output = Result<(), RecorderError>> + Send;
}

/// Recorder that drops everything. For callers that opt out of persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl CheckpointRecorder for NullRecorder {
    async fn record_checkpoint(&self, _checkpoint: &NodeCheckpoint) -> Result<(), RecorderError> {
        Ok(())
    }

    async fn record_agent_action(&self, _action: &AgentActionLog) -> Result<(), RecorderError> {
        Ok(())
    }
}

/// In-memory recorder, used by tests and local tooling to inspect the
/// checkpoint stream of a run.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    checkpoints: Mutex<Vec<NodeCheckpoint>>,
    actions: Mutex<Vec<AgentActionLog>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> Vec<NodeCheckpoint> {
        self.checkpoints.lock().expect("recorder mutex poisoned").clone()
    }

    pub fn actions(&self) -> Vec<AgentActionLog> {
        self.actions.lock().expect("recorder mutex poisoned").clone()
    }

    /// Number of checkpoints recorded for a given node name.
    pub fn visits(&self, node: &str) -> usize {
        self.checkpoints
            .lock()
            .expect("recorder mutex poisoned")
            .iter()
            .filter(|cp| cp.node == node)
            .count()
    }
}

impl CheckpointRecorder for MemoryRecorder {
    async fn record_checkpoint(&self, checkpoint: &NodeCheckpoint) -> Result<(), RecorderError> {
        self.checkpoints
            .lock()
            .expect("recorder mutex poisoned")
            .push(checkpoint.clone());
        Ok(())
    }

    async fn record_agent_action(&self, action: &AgentActionLog) -> Result<(), RecorderError> {
        self.actions
            .lock()
            .expect("recorder mutex poisoned")
            .push(action.clone());
        Ok(())
    }
}
