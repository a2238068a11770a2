//! JSONL audit recorder.
//!
//! Appends one JSON line per checkpoint to `checkpoints.jsonl` and one per
//! agent action to `actions.jsonl` under the configured directory. Appends
//! are serialized through an async mutex so concurrent branch checkpoints
//! never interleave within a line.
//!
//! Recording is best-effort by contract; the executor logs and drops any
//! error returned from here.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use paperforge_core::workflow::checkpoint::CheckpointRecorder;
use paperforge_types::checkpoint::{AgentActionLog, NodeCheckpoint, RecorderError};

pub struct JsonlRecorder {
    checkpoint_path: PathBuf,
    action_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecorder {
    /// Create a recorder writing under `dir`, creating the directory if
    /// needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| RecorderError::Storage(format!("creating '{}': {e}", dir.display())))?;
        Ok(Self {
            checkpoint_path: dir.join("checkpoints.jsonl"),
            action_path: dir.join("actions.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    async fn append<T: Serialize>(&self, path: &Path, entry: &T) -> Result<(), RecorderError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| RecorderError::Serialization(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| RecorderError::Storage(format!("opening '{}': {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| RecorderError::Storage(format!("writing '{}': {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| RecorderError::Storage(format!("flushing '{}': {e}", path.display())))?;
        Ok(())
    }
}

impl CheckpointRecorder for JsonlRecorder {
    async fn record_checkpoint(&self, checkpoint: &NodeCheckpoint) -> Result<(), RecorderError> {
        self.append(&self.checkpoint_path, checkpoint).await
    }

    async fn record_agent_action(&self, action: &AgentActionLog) -> Result<(), RecorderError> {
        self.append(&self.action_path, action).await
    }
}
