//! Task service: owns running workflows and their externally visible state.
//!
//! One service instance owns one engine and a registry of task records.
//! Submission spawns the workflow onto the runtime and returns immediately;
//! progress flows back through a tracking recorder that tees checkpoints
//! into the registry, so status queries never touch a running workflow.
//!
//! Failure detail stays inside the process: a failed task exposes only an
//! opaque `error_ref` that correlates with the server logs.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use paperforge_types::checkpoint::{AgentActionLog, NodeCheckpoint, RecorderError};
use paperforge_types::research::{Contradiction, ResearchState, Source, TaskStatus};

use crate::llm::{PricingLookup, TextGenerator};
use crate::nodes::NodeModels;
use crate::resilience::{BreakerRegistry, RetryPolicy};
use crate::workflow::checkpoint::CheckpointRecorder;
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::executor::NodeExecutor;
use crate::workflow::node::NodeName;

/// Externally visible view of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub current_node: Option<String>,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub error_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deliverables of a completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResultView {
    pub task_id: Uuid,
    pub final_paper: String,
    pub sources: Vec<Source>,
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task {0} has not finished")]
    NotReady(Uuid),

    #[error("task failed (ref {error_ref:?})")]
    Failed { error_ref: Option<Uuid> },

    #[error("task {0} was cancelled")]
    Cancelled(Uuid),

    #[error("task {0} is already finished")]
    AlreadyTerminal(Uuid),
}

struct TaskRecord {
    view: TaskStatusView,
    cancel: CancellationToken,
    final_state: Option<ResearchState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Recorder that tees checkpoints into the task registry before forwarding
/// them to the configured persistence recorder.
pub struct TrackingRecorder<R> {
    inner: Arc<R>,
    tasks: Arc<DashMap<Uuid, TaskRecord>>,
}

impl<R> TrackingRecorder<R> {
    fn update_view(&self, checkpoint: &NodeCheckpoint) {
        if let Some(mut record) = self.tasks.get_mut(&checkpoint.task_id) {
            let progress = NodeName::parse(&checkpoint.node)
                .map(|n| n.progress_percent())
                .unwrap_or(record.view.progress_percent);
            // Fan-out branches report out of order; progress never moves
            // backwards.
            record.view.progress_percent = record.view.progress_percent.max(progress);
            record.view.current_node = Some(checkpoint.node.clone());
            record.view.status = checkpoint.status_after;
            record.view.tokens_used = checkpoint.snapshot.tokens_used;
            record.view.cost_usd = checkpoint.snapshot.cost;
            record.view.updated_at = checkpoint.recorded_at;
        }
    }
}

impl<R: CheckpointRecorder> CheckpointRecorder for TrackingRecorder<R> {
    async fn record_checkpoint(&self, checkpoint: &NodeCheckpoint) -> Result<(), RecorderError> {
        self.update_view(checkpoint);
        self.inner.record_checkpoint(checkpoint).await
    }

    async fn record_agent_action(&self, action: &AgentActionLog) -> Result<(), RecorderError> {
        self.inner.record_agent_action(action).await
    }
}

pub struct TaskService<G, R, P>
where
    G: TextGenerator + 'static,
    R: CheckpointRecorder + 'static,
    P: PricingLookup + 'static,
{
    engine: Arc<WorkflowEngine<G, TrackingRecorder<R>, P>>,
    tasks: Arc<DashMap<Uuid, TaskRecord>>,
}

impl<G, R, P> TaskService<G, R, P>
where
    G: TextGenerator + 'static,
    R: CheckpointRecorder + 'static,
    P: PricingLookup + 'static,
{
    pub fn new(
        generator: Arc<G>,
        recorder: Arc<R>,
        pricing: Arc<P>,
        policy: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
        models: NodeModels,
    ) -> Self {
        let tasks: Arc<DashMap<Uuid, TaskRecord>> = Arc::new(DashMap::new());
        let tracking = Arc::new(TrackingRecorder {
            inner: recorder,
            tasks: Arc::clone(&tasks),
        });
        let executor = NodeExecutor::new(generator, tracking, pricing, policy, breakers);
        Self {
            engine: Arc::new(WorkflowEngine::new(executor, models)),
            tasks,
        }
    }

    /// Submit a new research task. Returns once the workflow is spawned.
    pub fn start(&self, topic: impl Into<String>, requirements: impl Into<String>) -> Uuid {
        let task_id = Uuid::now_v7();
        let state = ResearchState::new(task_id, topic, requirements);
        let cancel = CancellationToken::new();

        self.tasks.insert(
            task_id,
            TaskRecord {
                view: TaskStatusView {
                    task_id,
                    status: TaskStatus::Pending,
                    progress_percent: 0,
                    current_node: None,
                    tokens_used: 0,
                    cost_usd: 0.0,
                    error_ref: None,
                    created_at: state.created_at,
                    updated_at: state.updated_at,
                },
                cancel: cancel.clone(),
                final_state: None,
                handle: Mutex::new(None),
            },
        );

        let engine = Arc::clone(&self.engine);
        let tasks = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            let result = engine.run(state, &cancel).await;
            if let Some(mut record) = tasks.get_mut(&task_id) {
                match result {
                    Ok(final_state) => {
                        record.view.status = final_state.status;
                        record.view.tokens_used = final_state.tokens_used;
                        record.view.cost_usd = final_state.cost;
                        record.view.error_ref = final_state.error_ref;
                        record.view.updated_at = final_state.updated_at;
                        if final_state.status == TaskStatus::Completed {
                            record.view.progress_percent = 100;
                        }
                        record.final_state = Some(final_state);
                    }
                    Err(err) => {
                        // The record could not legally start or finish. Can
                        // only happen if the registry handed out a non-pending
                        // record, so treat it as a failed task.
                        tracing::error!(task_id = %task_id, error = %err, "workflow rejected task record");
                        record.view.status = TaskStatus::Failed;
                        record.view.error_ref = Some(Uuid::now_v7());
                        record.view.updated_at = Utc::now();
                    }
                }
            }
        });

        if let Some(record) = self.tasks.get(&task_id) {
            *record.handle.lock().expect("task handle mutex poisoned") = Some(handle);
        }

        tracing::info!(task_id = %task_id, "task submitted");
        task_id
    }

    /// Current externally visible state of a task.
    pub fn status(&self, task_id: Uuid) -> Result<TaskStatusView, TaskError> {
        self.tasks
            .get(&task_id)
            .map(|record| record.view.clone())
            .ok_or(TaskError::NotFound(task_id))
    }

    /// The finished paper with its source list and any unresolved
    /// contradictions. Errors until the task reaches `Completed`.
    pub fn result(&self, task_id: Uuid) -> Result<TaskResultView, TaskError> {
        let record = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;
        match record.view.status {
            TaskStatus::Completed => {
                let result = record
                    .final_state
                    .as_ref()
                    .map(|s| TaskResultView {
                        task_id,
                        final_paper: s.final_paper.clone(),
                        sources: s.sources.clone(),
                        contradictions: s.contradictions.clone(),
                    })
                    .unwrap_or(TaskResultView {
                        task_id,
                        final_paper: String::new(),
                        sources: Vec::new(),
                        contradictions: Vec::new(),
                    });
                Ok(result)
            }
            TaskStatus::Failed => Err(TaskError::Failed {
                error_ref: record.view.error_ref,
            }),
            TaskStatus::Cancelled => Err(TaskError::Cancelled(task_id)),
            TaskStatus::Pending | TaskStatus::Running => Err(TaskError::NotReady(task_id)),
        }
    }

    /// Request cancellation of a running task.
    ///
    /// Cancellation is cooperative: the workflow stops at the next node
    /// boundary, so a short delay between this call and the `Cancelled`
    /// status is normal.
    pub fn cancel(&self, task_id: Uuid) -> Result<(), TaskError> {
        let record = self
            .tasks
            .get(&task_id)
            .ok_or(TaskError::NotFound(task_id))?;
        if record.view.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal(task_id));
        }
        tracing::info!(task_id = %task_id, "cancellation requested");
        record.cancel.cancel();
        Ok(())
    }

    /// Wait for a task's workflow to finish. Mainly for tests and shutdown.
    pub async fn wait(&self, task_id: Uuid) -> Result<(), TaskError> {
        let handle = {
            let record = self
                .tasks
                .get(&task_id)
                .ok_or(TaskError::NotFound(task_id))?;
            record
                .handle
                .lock()
                .expect("task handle mutex poisoned")
                .take()
        };
        if let Some(handle) = handle {
            // A panicked workflow task still leaves the view terminal via the
            // registry update above; surface nothing extra here.
            let _ = handle.await;
        }
        Ok(())
    }
}
