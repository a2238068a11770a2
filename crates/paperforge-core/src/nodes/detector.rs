//! Detector: surfaces contradictions between verified sources.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{Contradiction, ResearchState, Severity, StateUpdate};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

pub struct DetectorNode {
    model: String,
}

#[derive(Deserialize)]
struct ContradictionPayload {
    source_a_id: String,
    source_b_id: String,
    #[serde(default)]
    claim_a: String,
    #[serde(default)]
    claim_b: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    description: String,
}

fn parse_severity(raw: &str) -> Severity {
    match raw.to_lowercase().as_str() {
        "critical" | "major" => Severity::Major,
        "moderate" => Severity::Moderate,
        _ => Severity::Minor,
    }
}

impl DetectorNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn prompt(state: &ResearchState) -> String {
        let mut listing = String::new();
        for source in &state.verified_sources {
            listing.push_str(&format!(
                "id: {}\ntitle: {}\nclaim: {}\n\n",
                source.id, source.title, source.excerpt
            ));
        }
        format!(
            "You are a contradiction analyst.\n\
             \n\
             Compare the claims of the verified sources below and list every \
             pair whose claims contradict each other. Report nothing for pairs \
             that merely differ in emphasis.\n\
             \n\
             SOURCES\n\
             -------\n\
             {listing}\
             Return ONLY a JSON array (empty if no contradictions):\n\
             [\n\
               {{\"source_a_id\": \"...\", \"source_b_id\": \"...\", \"claim_a\": \"...\", \
             \"claim_b\": \"...\", \"severity\": \"minor|moderate|major\", \
             \"description\": \"one sentence\"}}\n\
             ]"
        )
    }
}

impl ResearchNode for DetectorNode {
    fn name(&self) -> NodeName {
        NodeName::Detector
    }

    async fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> Result<NodeOutput, LlmError> {
        if state.verified_sources.len() < 2 {
            return Ok(NodeOutput {
                update: StateUpdate::Contradictions {
                    contradictions: Vec::new(),
                },
                usage: None,
                model: self.model.clone(),
                input_summary: String::new(),
                output_summary: "not enough verified sources to compare".to_string(),
            });
        }

        let prompt = Self::prompt(state);
        let response = generator
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt: prompt.clone(),
                max_tokens: 1500,
                temperature: Some(0.3),
            })
            .await?;

        let contradictions = match parse::parse_json::<Vec<ContradictionPayload>>(&response.content)
        {
            Ok(payloads) => payloads
                .into_iter()
                // Drop entries that name sources we never gave the model.
                .filter(|p| {
                    let known = |id: &str| state.verified_sources.iter().any(|s| s.id == id);
                    known(&p.source_a_id) && known(&p.source_b_id)
                })
                .map(|p| {
                    let excerpt_of = |id: &str| {
                        state
                            .verified_sources
                            .iter()
                            .find(|s| s.id == id)
                            .map(|s| s.excerpt.clone())
                            .unwrap_or_default()
                    };
                    Contradiction {
                        claim_a: if p.claim_a.is_empty() {
                            excerpt_of(&p.source_a_id)
                        } else {
                            p.claim_a
                        },
                        claim_b: if p.claim_b.is_empty() {
                            excerpt_of(&p.source_b_id)
                        } else {
                            p.claim_b
                        },
                        severity: parse_severity(&p.severity),
                        description: p.description,
                        source_a_id: p.source_a_id,
                        source_b_id: p.source_b_id,
                    }
                })
                .collect(),
            Err(_) => {
                // Unusable output reads as no contradictions found.
                tracing::warn!("detector output unusable; assuming no contradictions");
                Vec::new()
            }
        };

        let found = contradictions.len();
        tracing::info!(contradictions = found, "contradiction detection complete");

        Ok(NodeOutput {
            update: StateUpdate::Contradictions { contradictions },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: summarize(&format!("{found} contradictions detected")),
        })
    }
}
