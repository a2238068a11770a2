//! Declarative routing between pipeline phases.
//!
//! Each router reads its predicate off the task record and returns a tagged
//! [`Route`] so the transition table stays explicit and exhaustively
//! checkable, instead of ad hoc boolean branching inside the engine loop.
//!
//! The quality and confidence scores are opaque floats produced by node
//! business logic; the engine cares only about their threshold semantics.
//! A missing or non-finite score is a fatal logic error.

use paperforge_types::research::ResearchState;

use super::node::{NodeError, NodeName};

/// Source quality below this triggers the one-shot research fallback.
pub const QUALITY_FALLBACK_THRESHOLD: f64 = 0.3;

/// Synthesis confidence below this routes through the redo pass.
pub const CONFIDENCE_REDO_THRESHOLD: f64 = 0.5;

/// Routing decision after a node completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Proceed forward to the given node.
    Continue(NodeName),
    /// Loop back: re-enter an earlier phase at the given node.
    Retry(NodeName),
    /// The pipeline is done.
    Terminate,
}

/// Read a routing score, rejecting missing and non-finite values.
fn routing_score(value: Option<f64>, field: &str) -> Result<f64, NodeError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(NodeError::Logic(format!(
            "routing field '{field}' is not finite: {v}"
        ))),
        None => Err(NodeError::Logic(format!(
            "routing field '{field}' missing after node completion"
        ))),
    }
}

/// After the verifier: low quality triggers the fallback research pass, but
/// only once per run. A second low score proceeds regardless.
pub fn after_verifier(state: &ResearchState) -> Result<Route, NodeError> {
    let quality = routing_score(state.source_quality_score, "source_quality_score")?;
    if quality < QUALITY_FALLBACK_THRESHOLD && !state.fallback_triggered {
        Ok(Route::Retry(NodeName::RetryResearch))
    } else {
        Ok(Route::Continue(NodeName::Detector))
    }
}

/// After the synthesizer: low confidence takes the single redo pass on the
/// way to review; the redo never loops back here.
pub fn after_synthesizer(state: &ResearchState) -> Result<Route, NodeError> {
    let confidence = routing_score(state.synthesis_confidence, "synthesis_confidence")?;
    if confidence < CONFIDENCE_REDO_THRESHOLD {
        Ok(Route::Continue(NodeName::SynthesizerRedo))
    } else {
        Ok(Route::Continue(NodeName::Reviewer))
    }
}

/// After the reviewer: loop back to synthesis while revisions are requested
/// and attempts remain; otherwise proceed to formatting even if
/// `revision_needed` is still set.
pub fn after_reviewer(state: &ResearchState) -> Route {
    if state.revision_needed && state.current_revision_attempt < state.max_revision_attempts {
        Route::Retry(NodeName::Synthesizer)
    } else {
        Route::Continue(NodeName::Formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state() -> ResearchState {
        ResearchState::new(Uuid::now_v7(), "topic", "")
    }

    #[test]
    fn test_verifier_low_quality_first_pass_retries() {
        let mut s = state();
        s.source_quality_score = Some(0.2);
        assert_eq!(
            after_verifier(&s).unwrap(),
            Route::Retry(NodeName::RetryResearch)
        );
    }

    #[test]
    fn test_verifier_low_quality_after_fallback_continues() {
        let mut s = state();
        s.source_quality_score = Some(0.25);
        s.fallback_triggered = true;
        assert_eq!(
            after_verifier(&s).unwrap(),
            Route::Continue(NodeName::Detector)
        );
    }

    #[test]
    fn test_verifier_good_quality_continues() {
        let mut s = state();
        s.source_quality_score = Some(0.8);
        assert_eq!(
            after_verifier(&s).unwrap(),
            Route::Continue(NodeName::Detector)
        );
    }

    #[test]
    fn test_missing_quality_is_logic_error() {
        let s = state();
        let err = after_verifier(&s).unwrap_err();
        assert!(err.to_string().contains("source_quality_score"));
    }

    #[test]
    fn test_nan_quality_is_logic_error() {
        let mut s = state();
        s.source_quality_score = Some(f64::NAN);
        let err = after_verifier(&s).unwrap_err();
        assert!(err.to_string().contains("not finite"));
    }

    #[test]
    fn test_synthesizer_low_confidence_takes_redo() {
        let mut s = state();
        s.synthesis_confidence = Some(0.4);
        assert_eq!(
            after_synthesizer(&s).unwrap(),
            Route::Continue(NodeName::SynthesizerRedo)
        );
    }

    #[test]
    fn test_synthesizer_confident_goes_straight_to_review() {
        let mut s = state();
        s.synthesis_confidence = Some(0.5);
        assert_eq!(
            after_synthesizer(&s).unwrap(),
            Route::Continue(NodeName::Reviewer)
        );
    }

    #[test]
    fn test_reviewer_loops_while_attempts_remain() {
        let mut s = state();
        s.max_revision_attempts = 2;
        s.revision_needed = true;
        s.current_revision_attempt = 0;
        assert_eq!(after_reviewer(&s), Route::Retry(NodeName::Synthesizer));
        s.current_revision_attempt = 1;
        assert_eq!(after_reviewer(&s), Route::Retry(NodeName::Synthesizer));
    }

    #[test]
    fn test_reviewer_at_max_attempts_proceeds_despite_revision_flag() {
        let mut s = state();
        s.max_revision_attempts = 2;
        s.revision_needed = true;
        s.current_revision_attempt = 2;
        assert_eq!(after_reviewer(&s), Route::Continue(NodeName::Formatter));
    }

    #[test]
    fn test_reviewer_no_revision_proceeds() {
        let mut s = state();
        s.revision_needed = false;
        assert_eq!(after_reviewer(&s), Route::Continue(NodeName::Formatter));
    }
}
