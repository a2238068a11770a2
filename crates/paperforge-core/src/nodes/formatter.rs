//! Formatter: final formatting pass over the draft.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, StateUpdate};

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

pub struct FormatterNode {
    model: String,
}

impl FormatterNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn prompt(state: &ResearchState) -> String {
        let mut prompt = String::from(
            "You are a formatting specialist.\n\
             \n\
             Reformat the paper below in APA 7th edition style: polish section \
             headings, ensure citations and the reference list are properly \
             styled, and fix markdown structure. Do not change the substance.\n",
        );
        if !state.issues.is_empty() {
            prompt.push_str(&format!(
                "\nWhile formatting, also address these outstanding review issues:\n{}\n",
                state
                    .issues
                    .iter()
                    .map(|i| format!("- {i}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }
        prompt.push_str(&format!(
            "\nPAPER\n-----\n{}\n\nReturn only the formatted paper.",
            state.draft
        ));
        prompt
    }
}

impl ResearchNode for FormatterNode {
    fn name(&self) -> NodeName {
        NodeName::Formatter
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
                max_tokens: 4000,
                temperature: Some(0.25),
            })
            .await?;

        // An empty formatting result must not lose the paper; ship the
        // unformatted draft instead.
        let paper = if response.content.trim().is_empty() {
            tracing::warn!("formatter returned empty output; keeping unformatted draft");
            state.draft.clone()
        } else {
            response.content.clone()
        };

        let preview = summarize(&paper);
        Ok(NodeOutput {
            update: StateUpdate::FinalPaper { paper },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: preview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::SingleResponseGenerator;
    use uuid::Uuid;

    fn state_with_draft() -> ResearchState {
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        state.draft = "# Rough Draft".to_string();
        state
    }

    #[tokio::test]
    async fn test_formatted_output_becomes_final_paper() {
        let generator = SingleResponseGenerator::text("# Polished Paper\n\nBody.");
        let output = FormatterNode::new("format-model")
            .run(&state_with_draft(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::FinalPaper { paper } => {
                assert!(paper.starts_with("# Polished Paper"))
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_output_falls_back_to_draft() {
        let generator = SingleResponseGenerator::text("   \n");
        let output = FormatterNode::new("format-model")
            .run(&state_with_draft(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::FinalPaper { paper } => assert_eq!(paper, "# Rough Draft"),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_carries_outstanding_issues() {
        let mut state = state_with_draft();
        state.issues = vec!["Inconsistent citation style".to_string()];
        let prompt = FormatterNode::prompt(&state);
        assert!(prompt.contains("Inconsistent citation style"));
    }
}
