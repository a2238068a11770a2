//! Node identities, the `ResearchNode` trait, and executor-level errors.

use std::fmt;

use paperforge_types::llm::{LlmError, Usage};
use paperforge_types::research::{ResearchState, StateUpdate};

use crate::llm::TextGenerator;

/// Identity of one node in the fixed pipeline topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeName {
    Planner,
    Researcher(usize),
    RetryResearch,
    Verifier,
    Detector,
    Synthesizer,
    SynthesizerRedo,
    Reviewer,
    Formatter,
}

impl NodeName {
    /// Rough completion percentage once this node has finished, for the
    /// status query surface.
    pub fn progress_percent(&self) -> u8 {
        match self {
            NodeName::Planner => 10,
            NodeName::Researcher(_) => 40,
            NodeName::RetryResearch => 45,
            NodeName::Verifier => 55,
            NodeName::Detector => 65,
            NodeName::Synthesizer => 80,
            NodeName::SynthesizerRedo => 82,
            NodeName::Reviewer => 90,
            NodeName::Formatter => 100,
        }
    }
}

impl NodeName {
    /// Parse the display form back into an identity (checkpoints store node
    /// names as strings).
    pub fn parse(name: &str) -> Option<NodeName> {
        if let Some(branch) = name.strip_prefix("researcher_") {
            return branch.parse().ok().map(NodeName::Researcher);
        }
        match name {
            "planner" => Some(NodeName::Planner),
            "retry_research" => Some(NodeName::RetryResearch),
            "verifier" => Some(NodeName::Verifier),
            "detector" => Some(NodeName::Detector),
            "synthesizer" => Some(NodeName::Synthesizer),
            "synthesizer_redo" => Some(NodeName::SynthesizerRedo),
            "reviewer" => Some(NodeName::Reviewer),
            "formatter" => Some(NodeName::Formatter),
            _ => None,
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeName::Planner => write!(f, "planner"),
            NodeName::Researcher(branch) => write!(f, "researcher_{branch}"),
            NodeName::RetryResearch => write!(f, "retry_research"),
            NodeName::Verifier => write!(f, "verifier"),
            NodeName::Detector => write!(f, "detector"),
            NodeName::Synthesizer => write!(f, "synthesizer"),
            NodeName::SynthesizerRedo => write!(f, "synthesizer_redo"),
            NodeName::Reviewer => write!(f, "reviewer"),
            NodeName::Formatter => write!(f, "formatter"),
        }
    }
}

/// Result of one successful node run.
///
/// The node never mutates the task record itself; it returns a typed
/// `StateUpdate` that the executor applies, plus the usage to bill and
/// trimmed prompt/output previews for the agent-action audit log.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub update: StateUpdate,
    pub usage: Option<Usage>,
    pub model: String,
    pub input_summary: String,
    pub output_summary: String,
}

/// Length cap for audit-log previews.
const SUMMARY_LEN: usize = 200;

/// Truncate a prompt or output to an audit-log preview.
pub fn summarize(text: &str) -> String {
    if text.len() <= SUMMARY_LEN {
        text.to_string()
    } else {
        let mut end = SUMMARY_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// One workflow step: maps the current task record to a typed update.
///
/// A node may perform at most one external generation call per run; the
/// executor owns deadlines and retries around the whole run.
pub trait ResearchNode: Send + Sync {
    fn name(&self) -> NodeName;

    fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> impl std::future::Future<Output = Result<NodeOutput, LlmError>> + Send;
}

/// Executor-level failure classification for one node invocation.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The node (or its external call) exceeded its deadline.
    #[error("node timed out")]
    Timeout,

    /// Transient external failure; surfaced only once retries are exhausted.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Permanent external failure (auth, bad request); never retried.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The dependency's circuit breaker is open; failed fast without calling.
    #[error("circuit open for dependency '{0}'")]
    CircuitOpen(String),

    /// Missing or invalid routing value, or a broken engine invariant. Fatal.
    #[error("workflow logic error: {0}")]
    Logic(String),
}

impl From<LlmError> for NodeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => NodeError::Timeout,
            LlmError::AuthenticationFailed | LlmError::InvalidRequest(..) => {
                NodeError::Permanent(err.to_string())
            }
            // Parse errors are absorbed inside nodes; one leaking this far is
            // treated like any other transient provider fault.
            LlmError::RateLimited { .. }
            | LlmError::Overloaded(..)
            | LlmError::Provider { .. }
            | LlmError::Parse(..) => NodeError::Transient(err.to_string()),
        }
    }
}
