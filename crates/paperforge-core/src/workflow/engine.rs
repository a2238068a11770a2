//! The fixed-topology workflow engine.
//!
//! Topology: plan, fan out to five parallel researchers, join, verify with a
//! one-shot research fallback, detect contradictions, synthesize with a
//! confidence-gated redo pass, review with a bounded revision loop, format.
//!
//! The engine owns all routing-state mutation (fallback flag, revision
//! counter) and drives every node through the executor, so each invocation
//! gets the same deadline/retry/breaker treatment and checkpoint trail.
//! Node failures fail the task; failures inside the research fan-out are the
//! one exception and are absorbed at the join point.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use paperforge_types::research::{ResearchState, StateError, TaskStatus, RESEARCH_BRANCHES};

use crate::llm::{PricingLookup, TextGenerator};
use crate::nodes::{
    DetectorNode, FormatterNode, NodeModels, PlannerNode, ResearcherNode, ReviewerNode,
    SynthesizerNode, VerifierNode,
};

use super::checkpoint::CheckpointRecorder;
use super::executor::NodeExecutor;
use super::node::{NodeError, NodeName, ResearchNode};
use super::routing::{self, Route};

/// Upper bound on node invocations per run. The longest legal path is well
/// under this; hitting it means routing is broken.
pub const DEFAULT_MAX_STEPS: u32 = 64;

enum StepOutcome {
    Done(ResearchState),
    Failed(NodeError),
    Cancelled,
}

pub struct WorkflowEngine<G, R, P>
where
    G: TextGenerator + 'static,
    R: CheckpointRecorder + 'static,
    P: PricingLookup + 'static,
{
    executor: NodeExecutor<G, R, P>,
    models: NodeModels,
    max_steps: u32,
}

impl<G, R, P> WorkflowEngine<G, R, P>
where
    G: TextGenerator + 'static,
    R: CheckpointRecorder + 'static,
    P: PricingLookup + 'static,
{
    pub fn new(executor: NodeExecutor<G, R, P>, models: NodeModels) -> Self {
        Self {
            executor,
            models,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Drive one pending task to a terminal status.
    ///
    /// Always returns the task record at `Completed`, `Failed`, or
    /// `Cancelled`. `Err` is reserved for records that cannot legally start
    /// or finish, which indicates caller misuse.
    pub async fn run(
        &self,
        mut state: ResearchState,
        cancel: &CancellationToken,
    ) -> Result<ResearchState, StateError> {
        if cancel.is_cancelled() {
            state.transition(TaskStatus::Cancelled)?;
            return Ok(state);
        }
        state.transition(TaskStatus::Running)?;

        if state.topic.trim().is_empty() {
            return self.fail(
                state,
                NodeError::Logic("task has an empty topic".to_string()),
            );
        }

        tracing::info!(task_id = %state.task_id, topic = state.topic.as_str(), "workflow started");

        let mut seq: u32 = 0;
        let mut steps: u32 = 0;

        // Phase 1: plan.
        seq += 1;
        steps += 1;
        let planner = PlannerNode::new(self.models.planning.clone());
        match self.step(&planner, state.clone(), seq, cancel).await {
            StepOutcome::Done(next) => state = next,
            StepOutcome::Failed(err) => return self.fail(state, err),
            StepOutcome::Cancelled => return self.cancelled(state),
        }

        // Phase 2: research fan-out. Branch failures are absorbed; whatever
        // the surviving branches found is what verification works with.
        let base_source_count = state.sources.len();
        let base_tokens = state.tokens_used;
        let base_cost = state.cost;

        let mut join_set = JoinSet::new();
        for branch in 0..RESEARCH_BRANCHES {
            seq += 1;
            steps += 1;
            let exec = self.executor.clone();
            let node = ResearcherNode::branch(branch, self.models.research.clone());
            let branch_state = state.clone();
            let branch_seq = seq;
            join_set.spawn(async move {
                let result = exec.invoke(&node, branch_state, branch_seq).await;
                (branch, result)
            });
        }

        let mut branch_results: Vec<(usize, ResearchState)> = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    return self.cancelled(state);
                }
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((branch, Ok(branch_state)))) => {
                        branch_results.push((branch, branch_state));
                    }
                    Some(Ok((branch, Err(err)))) => {
                        tracing::warn!(
                            task_id = %state.task_id,
                            branch,
                            error = %err,
                            "researcher branch failed; absorbing at join"
                        );
                        state.record_branch_error(
                            branch,
                            NodeName::Researcher(branch).to_string(),
                            err.to_string(),
                        );
                    }
                    Some(Err(join_err)) => {
                        tracing::error!(
                            task_id = %state.task_id,
                            error = %join_err,
                            "researcher branch task aborted"
                        );
                    }
                },
            }
        }

        // Completion order is nondeterministic; merge in branch order so the
        // joined record is reproducible.
        branch_results.sort_by_key(|(branch, _)| *branch);
        for (_, branch_state) in &branch_results {
            state.merge_branch(branch_state, base_source_count, base_tokens, base_cost);
        }
        tracing::info!(
            task_id = %state.task_id,
            sources = state.sources.len(),
            failed_branches = state.branch_errors.len(),
            "research fan-out joined"
        );

        // Phase 3 onward: sequential loop with data-driven routing.
        let mut current = NodeName::Verifier;
        loop {
            steps += 1;
            if steps > self.max_steps {
                return self.fail(
                    state,
                    NodeError::Logic(format!("step budget exceeded ({} steps)", self.max_steps)),
                );
            }
            seq += 1;

            match current {
                NodeName::Verifier => {
                    let node = VerifierNode::new(self.models.verification.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    match routing::after_verifier(&state) {
                        Ok(Route::Retry(next)) => {
                            state.fallback_triggered = true;
                            tracing::info!(
                                task_id = %state.task_id,
                                quality = state.source_quality_score,
                                "source quality below threshold; taking research fallback"
                            );
                            current = next;
                        }
                        Ok(Route::Continue(next)) => current = next,
                        Ok(Route::Terminate) => break,
                        Err(err) => return self.fail(state, err),
                    }
                }
                NodeName::RetryResearch => {
                    let node = ResearcherNode::fallback(self.models.research.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    // Fresh sources go back through verification.
                    current = NodeName::Verifier;
                }
                NodeName::Detector => {
                    let node = DetectorNode::new(self.models.detection.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    current = NodeName::Synthesizer;
                }
                NodeName::Synthesizer => {
                    let node = SynthesizerNode::new(self.models.synthesis.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    match routing::after_synthesizer(&state) {
                        Ok(Route::Continue(next)) => current = next,
                        Ok(Route::Retry(next)) => current = next,
                        Ok(Route::Terminate) => break,
                        Err(err) => return self.fail(state, err),
                    }
                }
                NodeName::SynthesizerRedo => {
                    let node = SynthesizerNode::redo(self.models.synthesis.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    // The redo's confidence is accepted as-is.
                    current = NodeName::Reviewer;
                }
                NodeName::Reviewer => {
                    let node = ReviewerNode::new(self.models.review.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    match routing::after_reviewer(&state) {
                        Route::Retry(next) => {
                            state.current_revision_attempt += 1;
                            state.revision_needed = false;
                            tracing::info!(
                                task_id = %state.task_id,
                                attempt = state.current_revision_attempt,
                                max = state.max_revision_attempts,
                                "reviewer requested revision"
                            );
                            current = next;
                        }
                        Route::Continue(next) => current = next,
                        Route::Terminate => break,
                    }
                }
                NodeName::Formatter => {
                    let node = FormatterNode::new(self.models.formatting.clone());
                    match self.step(&node, state.clone(), seq, cancel).await {
                        StepOutcome::Done(next) => state = next,
                        StepOutcome::Failed(err) => return self.fail(state, err),
                        StepOutcome::Cancelled => return self.cancelled(state),
                    }
                    break;
                }
                NodeName::Planner | NodeName::Researcher(_) => {
                    return self.fail(
                        state,
                        NodeError::Logic(format!("routing reached {current} after fan-out")),
                    );
                }
            }
        }

        state.transition(TaskStatus::Completed)?;
        tracing::info!(
            task_id = %state.task_id,
            tokens = state.tokens_used,
            cost_usd = state.cost,
            "workflow completed"
        );
        Ok(state)
    }

    /// Run one node through the executor, racing against cancellation.
    async fn step<N: ResearchNode>(
        &self,
        node: &N,
        state: ResearchState,
        seq: u32,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        tokio::select! {
            _ = cancel.cancelled() => StepOutcome::Cancelled,
            result = self.executor.invoke(node, state, seq) => match result {
                Ok(next) => StepOutcome::Done(next),
                Err(err) => StepOutcome::Failed(err),
            },
        }
    }

    fn fail(
        &self,
        mut state: ResearchState,
        err: NodeError,
    ) -> Result<ResearchState, StateError> {
        let error_ref = Uuid::now_v7();
        // The raw error text stays in the logs; callers only ever see the
        // opaque reference.
        tracing::error!(
            task_id = %state.task_id,
            error_ref = %error_ref,
            error = %err,
            "workflow failed"
        );
        state.error_ref = Some(error_ref);
        state.transition(TaskStatus::Failed)?;
        Ok(state)
    }

    fn cancelled(&self, mut state: ResearchState) -> Result<ResearchState, StateError> {
        tracing::info!(task_id = %state.task_id, "workflow cancelled");
        state.transition(TaskStatus::Cancelled)?;
        Ok(state)
    }
}
