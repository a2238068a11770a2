//! Planner: decomposes the topic into one search query per researcher branch.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, StateUpdate, RESEARCH_BRANCHES};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

pub struct PlannerNode {
    model: String,
}

#[derive(Deserialize)]
struct PlanPayload {
    queries: Vec<String>,
}

impl PlannerNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn prompt(state: &ResearchState) -> String {
        let requirements = if state.requirements.is_empty() {
            "None specified"
        } else {
            &state.requirements
        };
        format!(
            "You are a research planning expert.\n\
             \n\
             Break the topic below into {RESEARCH_BRANCHES} specific, searchable queries that \
             together cover its breadth and depth. Queries must be distinct from \
             each other and use concrete keywords.\n\
             \n\
             TOPIC: {}\n\
             REQUIREMENTS: {}\n\
             \n\
             Return ONLY a JSON object:\n\
             {{\"queries\": [\"query 1\", \"query 2\", \"query 3\", \"query 4\", \"query 5\"]}}",
            state.topic, requirements
        )
    }

    /// Derive queries directly from the topic when the model output is
    /// unusable. Keeps the pipeline moving with generic angles.
    fn fallback_queries(topic: &str) -> Vec<String> {
        [
            "overview",
            "recent developments",
            "key challenges",
            "methodology",
            "future directions",
        ]
        .iter()
        .map(|angle| format!("{topic} {angle}"))
        .collect()
    }
}

impl ResearchNode for PlannerNode {
    fn name(&self) -> NodeName {
        NodeName::Planner
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
                max_tokens: 2000,
                temperature: Some(0.7),
            })
            .await?;

        let queries = match parse::parse_json::<PlanPayload>(&response.content) {
            Ok(plan) if !plan.queries.is_empty() => {
                let mut queries = plan.queries;
                if queries.len() < RESEARCH_BRANCHES {
                    tracing::warn!(
                        got = queries.len(),
                        expected = RESEARCH_BRANCHES,
                        "planner returned too few queries; padding from topic"
                    );
                    let mut padding = Self::fallback_queries(&state.topic);
                    padding.truncate(RESEARCH_BRANCHES - queries.len());
                    queries.extend(padding);
                }
                queries.truncate(RESEARCH_BRANCHES);
                queries
            }
            Ok(_) | Err(_) => {
                tracing::warn!("planner output unusable; deriving queries from topic");
                Self::fallback_queries(&state.topic)
            }
        };

        Ok(NodeOutput {
            update: StateUpdate::Plan {
                queries: queries.clone(),
            },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: summarize(&queries.join("; ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::SingleResponseGenerator;
    use uuid::Uuid;

    fn state() -> ResearchState {
        ResearchState::new(Uuid::now_v7(), "quantum error correction", "ieee style")
    }

    #[tokio::test]
    async fn test_valid_plan_is_parsed() {
        let generator = SingleResponseGenerator::json(
            r#"{"queries": ["q1", "q2", "q3", "q4", "q5"]}"#,
        );
        let output = PlannerNode::new("planner-model")
            .run(&state(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Plan { queries } => assert_eq!(queries.len(), 5),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_output_falls_back_to_topic_queries() {
        let generator = SingleResponseGenerator::text("I am unable to help with that.");
        let output = PlannerNode::new("planner-model")
            .run(&state(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Plan { queries } => {
                assert_eq!(queries.len(), 5);
                assert!(queries[0].starts_with("quantum error correction"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_plan_is_padded_to_branch_count() {
        let generator = SingleResponseGenerator::json(r#"{"queries": ["only one"]}"#);
        let output = PlannerNode::new("planner-model")
            .run(&state(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Plan { queries } => {
                assert_eq!(queries.len(), 5);
                assert_eq!(queries[0], "only one");
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }
}
