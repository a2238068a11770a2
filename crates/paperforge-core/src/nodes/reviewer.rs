//! Reviewer: structured peer review of the draft.
//!
//! An unparsable review is treated as a revision request, not a pass. The
//! bounded revision loop in the engine keeps that conservative default from
//! looping forever.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, StateUpdate};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

pub struct ReviewerNode {
    model: String,
}

#[derive(Deserialize)]
struct ReviewPayload {
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    revision_needed: bool,
}

impl ReviewerNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn prompt(state: &ResearchState) -> String {
        format!(
            "You are an academic peer reviewer.\n\
             \n\
             Review the draft below for accuracy against its sources, internal \
             consistency, completeness, and academic tone. Request a revision \
             only for substantive problems.\n\
             \n\
             DRAFT\n\
             -----\n\
             {}\n\
             \n\
             Return ONLY a JSON object:\n\
             {{\"feedback\": \"summary\", \"issues\": [\"issue 1\"], \"revision_needed\": false}}",
            state.draft
        )
    }
}

impl ResearchNode for ReviewerNode {
    fn name(&self) -> NodeName {
        NodeName::Reviewer
    }

    async fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> Result<NodeOutput, LlmError> {
        let prompt = Self::prompt(state);
        let response = generator
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt: prompt.clone(),
                max_tokens: 3000,
                temperature: Some(0.4),
            })
            .await?;

        let (feedback, issues, revision_needed) =
            match parse::parse_json::<ReviewPayload>(&response.content) {
                Ok(review) => (review.feedback, review.issues, review.revision_needed),
                Err(_) => {
                    tracing::warn!("reviewer output unusable; requesting revision");
                    (
                        "Review output could not be interpreted".to_string(),
                        vec!["Reviewer returned unstructured output".to_string()],
                        true,
                    )
                }
            };

        tracing::info!(
            revision_needed,
            issues = issues.len(),
            "review complete"
        );

        let preview = summarize(&feedback);
        Ok(NodeOutput {
            update: StateUpdate::Review {
                feedback,
                issues,
                revision_needed,
            },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: preview,
        })
    }
}
