//! Pipeline node implementations.
//!
//! Each node is a small struct implementing [`ResearchNode`]: it builds one
//! prompt from the task record, makes at most one generation call, parses
//! the output, and returns a typed update. Parse failures never escape a
//! node; every node carries a domain fallback for unusable model output.

pub mod detector;
pub mod formatter;
pub mod parse;
pub mod planner;
pub mod researcher;
pub mod reviewer;
pub mod synthesizer;
#[cfg(test)]
pub mod test_support;
pub mod verifier;

pub use detector::DetectorNode;
pub use formatter::FormatterNode;
pub use planner::PlannerNode;
pub use researcher::ResearcherNode;
pub use reviewer::ReviewerNode;
pub use synthesizer::SynthesizerNode;
pub use verifier::VerifierNode;

use serde::{Deserialize, Serialize};

/// Model selection per pipeline phase.
///
/// Defaults are the free-tier lineup; every phase can be overridden from
/// configuration independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeModels {
    pub planning: String,
    pub research: String,
    pub verification: String,
    pub detection: String,
    pub synthesis: String,
    pub review: String,
    pub formatting: String,
}

impl Default for NodeModels {
    fn default() -> Self {
        Self {
            planning: "deepseek/deepseek-r1-0528:free".to_string(),
            research: "qwen/qwen-2.5-7b-instruct:free".to_string(),
            verification: "deepseek/deepseek-r1-distill-qwen-7b:free".to_string(),
            detection: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
            synthesis: "deepseek/deepseek-r1-0528:free".to_string(),
            review: "google/gemma-3-27b:free".to_string(),
            formatting: "qwen/qwen-2.5-coder-7b-instruct:free".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models_are_free_tier() {
        let models = NodeModels::default();
        for model in [
            &models.planning,
            &models.research,
            &models.verification,
            &models.detection,
            &models.synthesis,
            &models.review,
            &models.formatting,
        ] {
            assert!(model.ends_with(":free"), "{model} is not free tier");
        }
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let models: NodeModels =
            serde_json::from_str(r#"{"synthesis": "moonshotai/kimi-k2.5"}"#).unwrap();
        assert_eq!(models.synthesis, "moonshotai/kimi-k2.5");
        assert_eq!(models.planning, NodeModels::default().planning);
    }
}
