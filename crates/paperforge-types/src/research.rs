//! Research task domain types.
//!
//! `ResearchState` is the complete mutable record of one task's progress
//! through the pipeline. It is created at task submission, mutated only
//! through `StateUpdate` values applied by the engine, and archived at a
//! terminal status. The whole record is JSON-serializable so it can be
//! snapshotted into checkpoints.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of parallel researcher branches in the fixed topology.
pub const RESEARCH_BRANCHES: usize = 5;

/// Execution status of a research task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Legal transitions: Pending -> Running -> {Completed, Failed, Cancelled}.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            (TaskStatus::Pending, TaskStatus::Cancelled) => true,
            (TaskStatus::Running, s) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("invalid task status: '{other}'")),
        }
    }
}

/// A research source gathered by a researcher branch.
///
/// `credibility` and `verified` start unset and are written exactly once by
/// the verification node; the record is immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Branch-namespaced identifier (e.g., `src-2-0`). Namespacing keeps
    /// concurrent branch writes disjoint so the fan-out merge is
    /// conflict-free.
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub publication: String,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Credibility in [0, 1]; `None` until the verifier has scored it.
    pub credibility: Option<f64>,
    pub verified: bool,
    pub excerpt: String,
    /// Relevance to the originating query, in [0, 1].
    pub relevance: f64,
}

/// Severity of a detected contradiction between two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
}

/// A contradiction between two verified sources. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub source_a_id: String,
    pub source_b_id: String,
    pub claim_a: String,
    pub claim_b: String,
    pub severity: Severity,
    pub description: String,
}

/// A recorded failure of one fan-out branch.
///
/// Branch failures are absorbed at the join point: the branch contributes no
/// sources but does not abort the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchError {
    pub branch: usize,
    pub node: String,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

/// The complete mutable record of one research task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub task_id: Uuid,
    pub topic: String,
    pub requirements: String,
    pub status: TaskStatus,

    // Pipeline artifacts, in production order.
    pub queries: Vec<String>,
    pub sources: Vec<Source>,
    pub verified_sources: Vec<Source>,
    pub verification_notes: String,
    pub contradictions: Vec<Contradiction>,
    pub draft: String,
    pub outline: Vec<String>,
    pub review_feedback: String,
    pub issues: Vec<String>,
    pub final_paper: String,

    // Usage totals. Monotonic for the life of the task.
    pub cost: f64,
    pub tokens_used: u64,

    // Routing state.
    /// One-shot: once true, never reverts within a run.
    pub fallback_triggered: bool,
    pub current_revision_attempt: u32,
    pub max_revision_attempts: u32,
    /// Mean source credibility in [0, 1], written by the verifier.
    pub source_quality_score: Option<f64>,
    /// Synthesizer self-assessed confidence in [0, 1].
    pub synthesis_confidence: Option<f64>,
    /// Set by the reviewer; cleared by the engine when a revision loop is taken.
    pub revision_needed: bool,

    /// Absorbed fan-out branch failures, for diagnostics.
    pub branch_errors: Vec<BranchError>,
    /// Opaque reference surfaced to callers when the task fails. The raw
    /// error text never leaves the process through the status query.
    pub error_ref: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchState {
    /// Create a fresh pending task record.
    pub fn new(task_id: Uuid, topic: impl Into<String>, requirements: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            topic: topic.into(),
            requirements: requirements.into(),
            status: TaskStatus::Pending,
            queries: Vec::new(),
            sources: Vec::new(),
            verified_sources: Vec::new(),
            verification_notes: String::new(),
            contradictions: Vec::new(),
            draft: String::new(),
            outline: Vec::new(),
            review_feedback: String::new(),
            issues: Vec::new(),
            final_paper: String::new(),
            cost: 0.0,
            tokens_used: 0,
            fallback_triggered: false,
            current_revision_attempt: 0,
            max_revision_attempts: 3,
            source_quality_score: None,
            synthesis_confidence: None,
            revision_needed: false,
            branch_errors: Vec::new(),
            error_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new status, enforcing the legal transition graph.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add token/cost usage to the running totals.
    ///
    /// Totals are monotonic: increments are non-negative by construction and
    /// negative cost inputs are clamped rather than subtracted.
    pub fn add_usage(&mut self, tokens: u64, cost: f64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        self.cost += cost.max(0.0);
        self.updated_at = Utc::now();
    }

    /// Apply a typed node update to the record.
    ///
    /// This is the only mutation path for pipeline artifacts; nodes declare
    /// what they write through the `StateUpdate` variant they return, and the
    /// exhaustive match here is the write contract.
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Plan { queries } => {
                self.queries = queries;
            }
            StateUpdate::Sources { sources } => {
                self.sources.extend(sources);
            }
            StateUpdate::Verification {
                scores,
                quality,
                notes,
            } => {
                for (id, score) in scores {
                    if let Some(source) = self.sources.iter_mut().find(|s| s.id == id) {
                        // Credibility is written exactly once; a re-run of the
                        // verifier after the fallback loop scores only sources
                        // it has not seen before.
                        if source.credibility.is_none() {
                            source.credibility = Some(score.clamp(0.0, 1.0));
                            source.verified = score >= 0.7;
                        }
                    }
                }
                self.verified_sources = self
                    .sources
                    .iter()
                    .filter(|s| s.verified)
                    .cloned()
                    .collect();
                self.source_quality_score = Some(quality.clamp(0.0, 1.0));
                self.verification_notes = notes;
            }
            StateUpdate::Contradictions { contradictions } => {
                self.contradictions = contradictions;
            }
            StateUpdate::Draft {
                draft,
                outline,
                confidence,
            } => {
                self.draft = draft;
                self.outline = outline;
                self.synthesis_confidence = Some(confidence.clamp(0.0, 1.0));
            }
            StateUpdate::Review {
                feedback,
                issues,
                revision_needed,
            } => {
                self.review_feedback = feedback;
                self.issues = issues;
                self.revision_needed = revision_needed;
            }
            StateUpdate::FinalPaper { paper } => {
                self.final_paper = paper;
            }
        }
        self.updated_at = Utc::now();
    }

    /// Merge a completed fan-out branch back into this record.
    ///
    /// `base_source_count` and `base_tokens`/`base_cost` describe the record
    /// at fan-out time; only what the branch appended on top of that is
    /// merged, so completion order does not matter.
    pub fn merge_branch(
        &mut self,
        branch_state: &ResearchState,
        base_source_count: usize,
        base_tokens: u64,
        base_cost: f64,
    ) {
        if branch_state.sources.len() > base_source_count {
            self.sources
                .extend_from_slice(&branch_state.sources[base_source_count..]);
        }
        self.add_usage(
            branch_state.tokens_used.saturating_sub(base_tokens),
            branch_state.cost - base_cost,
        );
    }

    /// Record an absorbed fan-out branch failure.
    pub fn record_branch_error(&mut self, branch: usize, node: impl Into<String>, error: impl Into<String>) {
        self.branch_errors.push(BranchError {
            branch,
            node: node.into(),
            error: error.into(),
            occurred_at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }
}

/// A typed mutation produced by one node.
///
/// Each node writes exactly one variant; the engine applies it through
/// [`ResearchState::apply`]. No node holds a mutable reference to the record,
/// which keeps cross-node field collisions impossible by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateUpdate {
    /// Planner output: the research queries, one per branch.
    Plan { queries: Vec<String> },
    /// Researcher output: branch-namespaced sources to append.
    Sources { sources: Vec<Source> },
    /// Verifier output: per-source credibility scores plus the aggregate
    /// quality score used for fallback routing.
    Verification {
        scores: Vec<(String, f64)>,
        quality: f64,
        notes: String,
    },
    /// Detector output.
    Contradictions { contradictions: Vec<Contradiction> },
    /// Synthesizer output, including the confidence used for redo routing.
    Draft {
        draft: String,
        outline: Vec<String>,
        confidence: f64,
    },
    /// Reviewer output.
    Review {
        feedback: String,
        issues: Vec<String>,
        revision_needed: bool,
    },
    /// Formatter output (terminal).
    FinalPaper { paper: String },
}

/// Errors for illegal state record operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}
