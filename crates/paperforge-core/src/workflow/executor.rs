//! Node executor: timeout, retry, circuit breaking, and checkpoint emission
//! around a single node invocation.
//!
//! The executor owns everything that makes an unreliable external call safe
//! to sequence: a per-call deadline around the node's run, exponential
//! backoff retries gated by the dependency's circuit breaker, a per-node
//! overall deadline around the whole retry loop, usage billing on success,
//! and one best-effort checkpoint event per completion or failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::Instrument;

use paperforge_types::checkpoint::{AgentActionLog, NodeCheckpoint};
use paperforge_types::research::ResearchState;

use crate::llm::{PricingLookup, TextGenerator};
use crate::resilience::{BreakerRegistry, CircuitBreaker, RetryPolicy};

use super::checkpoint::CheckpointRecorder;
use super::ledger::UsageLedger;
use super::node::{NodeError, NodeOutput, ResearchNode};

/// Default deadline for one external call (one attempt).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default overall deadline for one node invocation, including retries and
/// backoff sleeps.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(180);

/// Executes one node with resilience policy applied.
///
/// Cheap to clone; the generator, recorder, pricing, and breaker registry are
/// shared behind `Arc` so fan-out branches can run through clones.
pub struct NodeExecutor<G, R, P>
where
    G: TextGenerator,
    R: CheckpointRecorder,
    P: PricingLookup,
{
    generator: Arc<G>,
    recorder: Arc<R>,
    ledger: UsageLedger<P>,
    policy: RetryPolicy,
    breakers: Arc<BreakerRegistry>,
    call_timeout: Duration,
    node_timeout: Duration,
}

impl<G, R, P> Clone for NodeExecutor<G, R, P>
where
    G: TextGenerator,
    R: CheckpointRecorder,
    P: PricingLookup,
{
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            recorder: Arc::clone(&self.recorder),
            ledger: self.ledger.clone(),
            policy: self.policy,
            breakers: Arc::clone(&self.breakers),
            call_timeout: self.call_timeout,
            node_timeout: self.node_timeout,
        }
    }
}

impl<G, R, P> NodeExecutor<G, R, P>
where
    G: TextGenerator,
    R: CheckpointRecorder,
    P: PricingLookup,
{
    pub fn new(
        generator: Arc<G>,
        recorder: Arc<R>,
        pricing: Arc<P>,
        policy: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            generator,
            recorder,
            ledger: UsageLedger::new(pricing),
            policy,
            breakers,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }

    /// Override the per-call and per-node deadlines.
    pub fn with_timeouts(mut self, call_timeout: Duration, node_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.node_timeout = node_timeout;
        self
    }

    /// Invoke one node against the given task record.
    ///
    /// On success, returns the record with the node's update applied and its
    /// usage billed. On failure, the record is left untouched and the error
    /// is classified for the engine. Either way, exactly one checkpoint event
    /// and one agent-action entry are emitted (best effort).
    pub async fn invoke<N: ResearchNode>(
        &self,
        node: &N,
        mut state: ResearchState,
        seq: u32,
    ) -> Result<ResearchState, NodeError> {
        let node_name = node.name().to_string();
        let status_before = state.status;
        let started = Instant::now();

        tracing::debug!(
            task_id = %state.task_id,
            node = node_name.as_str(),
            seq,
            "invoking node"
        );

        // GenAI semconv span around the whole invocation; request/usage
        // fields are filled in once the winning attempt reports them.
        let span = tracing::info_span!(
            "gen_ai.execute_node",
            gen_ai.operation.name = "execute_node",
            gen_ai.provider.name = self.generator.name(),
            gen_ai.agent.name = node_name.as_str(),
            gen_ai.request.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );

        let breaker = self.breakers.breaker_for(self.generator.name());
        let outcome = match tokio::time::timeout(
            self.node_timeout,
            self.run_with_retry(node, &state, &breaker, &node_name),
        )
        .instrument(span.clone())
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(NodeError::Timeout),
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let NodeOutput {
                    update,
                    usage,
                    model,
                    input_summary,
                    output_summary,
                } = output;

                span.record("gen_ai.request.model", model.as_str());
                if let Some(u) = usage {
                    span.record("gen_ai.usage.input_tokens", u.input_tokens);
                    span.record("gen_ai.usage.output_tokens", u.output_tokens);
                }

                let delta = self.ledger.bill(&mut state, &model, usage.as_ref());
                state.apply(update);

                self.emit_checkpoint(NodeCheckpoint {
                    task_id: state.task_id,
                    node: node_name.clone(),
                    seq,
                    status_before,
                    status_after: state.status,
                    duration_ms,
                    error: None,
                    snapshot: state.clone(),
                    recorded_at: Utc::now(),
                })
                .await;

                self.emit_agent_action(AgentActionLog {
                    task_id: state.task_id,
                    node: node_name.clone(),
                    model,
                    input_tokens: usage.map(|u| u.input_tokens).unwrap_or(0),
                    output_tokens: usage.map(|u| u.output_tokens).unwrap_or(0),
                    cost_usd: delta.cost_usd,
                    input_summary,
                    output_summary,
                    error: None,
                    recorded_at: Utc::now(),
                })
                .await;

                tracing::info!(
                    task_id = %state.task_id,
                    node = node_name.as_str(),
                    seq,
                    duration_ms,
                    tokens = delta.tokens,
                    "node completed"
                );

                Ok(state)
            }
            Err(err) => {
                let err_msg = err.to_string();

                self.emit_checkpoint(NodeCheckpoint {
                    task_id: state.task_id,
                    node: node_name.clone(),
                    seq,
                    status_before,
                    status_after: state.status,
                    duration_ms,
                    error: Some(err_msg.clone()),
                    snapshot: state.clone(),
                    recorded_at: Utc::now(),
                })
                .await;

                self.emit_agent_action(AgentActionLog {
                    task_id: state.task_id,
                    node: node_name.clone(),
                    model: String::new(),
                    input_tokens: 0,
                    output_tokens: 0,
                    cost_usd: 0.0,
                    input_summary: String::new(),
                    output_summary: String::new(),
                    error: Some(err_msg.clone()),
                    recorded_at: Utc::now(),
                })
                .await;

                tracing::warn!(
                    task_id = %state.task_id,
                    node = node_name.as_str(),
                    seq,
                    duration_ms,
                    error = err_msg.as_str(),
                    "node failed"
                );

                Err(err)
            }
        }
    }

    /// Run the node with per-attempt deadlines and backoff retries.
    ///
    /// A circuit-open rejection fails fast without consuming an attempt.
    /// Permanent failures bypass the retry loop and leave the breaker
    /// untouched. Every failed attempt records a breaker failure; success
    /// resets it.
    async fn run_with_retry<N: ResearchNode>(
        &self,
        node: &N,
        state: &ResearchState,
        breaker: &CircuitBreaker,
        node_name: &str,
    ) -> Result<NodeOutput, NodeError> {
        let mut last_err: Option<NodeError> = None;

        for attempt in 0..=self.policy.max_retries {
            if !breaker.should_allow() {
                tracing::warn!(
                    node = node_name,
                    breaker = breaker.name(),
                    "circuit open; rejecting node invocation"
                );
                return Err(NodeError::CircuitOpen(breaker.name().to_string()));
            }

            if attempt > 0 {
                let delay = self.policy.delay_for(attempt - 1);
                tracing::info!(
                    node = node_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying node after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.call_timeout, node.run(state, self.generator.as_ref()))
                .await
            {
                Ok(Ok(output)) => {
                    breaker.record_success();
                    return Ok(output);
                }
                Ok(Err(llm_err)) => {
                    let node_err = NodeError::from(llm_err);
                    if matches!(node_err, NodeError::Permanent(_)) {
                        tracing::error!(
                            node = node_name,
                            error = %node_err,
                            "permanent failure; not retrying"
                        );
                        return Err(node_err);
                    }
                    breaker.record_failure();
                    tracing::warn!(
                        node = node_name,
                        attempt = attempt + 1,
                        attempts = self.policy.max_retries + 1,
                        error = %node_err,
                        "node attempt failed"
                    );
                    last_err = Some(node_err);
                }
                Err(_elapsed) => {
                    breaker.record_failure();
                    tracing::warn!(
                        node = node_name,
                        attempt = attempt + 1,
                        attempts = self.policy.max_retries + 1,
                        "node attempt timed out"
                    );
                    last_err = Some(NodeError::Timeout);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| NodeError::Transient("all retry attempts failed".to_string())))
    }

    async fn emit_checkpoint(&self, checkpoint: NodeCheckpoint) {
        if let Err(err) = self.recorder.record_checkpoint(&checkpoint).await {
            tracing::warn!(
                task_id = %checkpoint.task_id,
                node = checkpoint.node.as_str(),
                seq = checkpoint.seq,
                error = %err,
                "checkpoint persistence failed; continuing"
            );
        }
    }

    async fn emit_agent_action(&self, action: AgentActionLog) {
        if let Err(err) = self.recorder.record_agent_action(&action).await {
            tracing::warn!(
                task_id = %action.task_id,
                node = action.node.as_str(),
                error = %err,
                "agent action persistence failed; continuing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::pricing::ZeroPricing;
    use crate::workflow::checkpoint::MemoryRecorder;
    use crate::workflow::node::NodeName;
    use paperforge_types::llm::{GenerateRequest, GenerateResponse, LlmError, Usage};
    use paperforge_types::research::StateUpdate;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Generator whose responses are scripted per call index.
    struct ScriptedGenerator {
        script: Mutex<Vec<Result<GenerateResponse, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<GenerateResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }

        fn ok(content: &str) -> Result<GenerateResponse, LlmError> {
            Ok(GenerateResponse {
                content: content.to_string(),
                model: "test-model".to_string(),
                usage: Some(Usage {
                    input_tokens: 100,
                    output_tokens: 50,
                }),
            })
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(LlmError::Provider {
                    message: "script exhausted".to_string(),
                });
            }
            script.remove(0)
        }
    }

    /// Minimal node: one generation call, content becomes the final paper.
    struct EchoNode;

    impl ResearchNode for EchoNode {
        fn name(&self) -> NodeName {
            NodeName::Formatter
        }

        async fn run<G: TextGenerator>(
            &self,
            _state: &ResearchState,
            generator: &G,
        ) -> Result<NodeOutput, LlmError> {
            let response = generator
                .generate(&GenerateRequest {
                    model: "test-model".to_string(),
                    prompt: "echo".to_string(),
                    max_tokens: 64,
                    temperature: None,
                })
                .await?;
            Ok(NodeOutput {
                update: StateUpdate::FinalPaper {
                    paper: response.content.clone(),
                },
                usage: response.usage,
                model: response.model,
                input_summary: "echo".to_string(),
                output_summary: response.content,
            })
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay_secs: 0.001,
            max_delay_secs: 0.002,
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        }
    }

    fn executor(
        generator: Arc<ScriptedGenerator>,
        recorder: Arc<MemoryRecorder>,
        breakers: Arc<BreakerRegistry>,
    ) -> NodeExecutor<ScriptedGenerator, MemoryRecorder, ZeroPricing> {
        NodeExecutor::new(
            generator,
            recorder,
            Arc::new(ZeroPricing),
            fast_policy(),
            breakers,
        )
        .with_timeouts(Duration::from_millis(200), Duration::from_secs(2))
    }

    fn running_state() -> ResearchState {
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        state.transition(paperforge_types::research::TaskStatus::Running).unwrap();
        state
    }

    #[tokio::test]
    async fn test_success_applies_update_and_bills_usage() {
        let generator = Arc::new(ScriptedGenerator::new(vec![ScriptedGenerator::ok("done")]));
        let recorder = Arc::new(MemoryRecorder::new());
        let exec = executor(
            Arc::clone(&generator),
            Arc::clone(&recorder),
            Arc::new(BreakerRegistry::with_defaults()),
        );

        let state = exec.invoke(&EchoNode, running_state(), 1).await.unwrap();
        assert_eq!(state.final_paper, "done");
        assert_eq!(state.tokens_used, 150);
        assert_eq!(recorder.checkpoints().len(), 1);
        assert_eq!(recorder.actions().len(), 1);
        assert!(recorder.checkpoints()[0].error.is_none());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_until_success() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(LlmError::Provider {
                message: "503".to_string(),
            }),
            Err(LlmError::RateLimited {
                retry_after_ms: Some(1),
            }),
            ScriptedGenerator::ok("third time"),
        ]));
        let recorder = Arc::new(MemoryRecorder::new());
        let breakers = Arc::new(BreakerRegistry::with_defaults());
        let exec = executor(Arc::clone(&generator), recorder, Arc::clone(&breakers));

        let state = exec.invoke(&EchoNode, running_state(), 1).await.unwrap();
        assert_eq!(state.final_paper, "third time");
        assert_eq!(generator.calls(), 3);
        // Success reset the breaker.
        assert_eq!(breakers.breaker_for("scripted").failure_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_propagate_last_error() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(LlmError::Provider { message: "a".to_string() }),
            Err(LlmError::Provider { message: "b".to_string() }),
            Err(LlmError::Provider { message: "c".to_string() }),
        ]));
        let recorder = Arc::new(MemoryRecorder::new());
        let exec = executor(
            Arc::clone(&generator),
            Arc::clone(&recorder),
            Arc::new(BreakerRegistry::with_defaults()),
        );

        let err = exec.invoke(&EchoNode, running_state(), 1).await.unwrap_err();
        assert!(matches!(err, NodeError::Transient(_)));
        assert!(err.to_string().contains('c'));
        assert_eq!(generator.calls(), 3);
        // Failure checkpoint was still emitted.
        assert_eq!(recorder.checkpoints().len(), 1);
        assert!(recorder.checkpoints()[0].error.is_some());
    }

    #[tokio::test]
    async fn test_permanent_failure_bypasses_retry() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(LlmError::AuthenticationFailed),
            ScriptedGenerator::ok("never reached"),
        ]));
        let recorder = Arc::new(MemoryRecorder::new());
        let breakers = Arc::new(BreakerRegistry::with_defaults());
        let exec = executor(Arc::clone(&generator), recorder, Arc::clone(&breakers));

        let err = exec.invoke(&EchoNode, running_state(), 1).await.unwrap_err();
        assert!(matches!(err, NodeError::Permanent(_)));
        assert_eq!(generator.calls(), 1);
        // Permanent failures do not count against the breaker.
        assert_eq!(breakers.breaker_for("scripted").failure_count(), 0);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast_without_calling() {
        let generator = Arc::new(ScriptedGenerator::new(vec![ScriptedGenerator::ok("unused")]));
        let recorder = Arc::new(MemoryRecorder::new());
        let breakers = Arc::new(BreakerRegistry::new(1, Duration::from_secs(600)));
        breakers.breaker_for("scripted").record_failure();
        let exec = executor(Arc::clone(&generator), recorder, Arc::clone(&breakers));

        let err = exec.invoke(&EchoNode, running_state(), 1).await.unwrap_err();
        assert!(matches!(err, NodeError::CircuitOpen(_)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_retries_are_not_billed() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(LlmError::Provider { message: "flaky".to_string() }),
            ScriptedGenerator::ok("ok"),
        ]));
        let recorder = Arc::new(MemoryRecorder::new());
        let exec = executor(
            Arc::clone(&generator),
            Arc::clone(&recorder),
            Arc::new(BreakerRegistry::with_defaults()),
        );

        let state = exec.invoke(&EchoNode, running_state(), 1).await.unwrap();
        // Only the winning attempt's usage lands on the record.
        assert_eq!(state.tokens_used, 150);
    }
}
