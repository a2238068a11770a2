//! Synthesizer: builds the draft paper from verified sources.
//!
//! The same node type serves three entries in the topology: the first
//! synthesis pass, the low-confidence redo pass, and re-entry from the
//! review loop. The redo variant folds the previous draft into its prompt;
//! review re-entry picks up the reviewer's feedback from the record.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, StateUpdate};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

/// Confidence assigned when the model reports none we can use. Neutral:
/// proceeds to review without the redo pass.
const FALLBACK_CONFIDENCE: f64 = 0.5;

pub struct SynthesizerNode {
    model: String,
    redo: bool,
}

#[derive(Deserialize)]
struct DraftPayload {
    #[serde(default)]
    outline: Vec<String>,
    draft: String,
    #[serde(default)]
    confidence: Option<f64>,
}

fn default_outline() -> Vec<String> {
    [
        "Introduction",
        "Background & Context",
        "Key Findings",
        "Areas of Debate",
        "Current Research Gaps",
        "Future Directions",
        "Conclusion",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl SynthesizerNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            redo: false,
        }
    }

    /// The second-chance pass taken when the first draft's confidence is low.
    pub fn redo(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            redo: true,
        }
    }

    fn prompt(&self, state: &ResearchState) -> String {
        let mut sources = String::new();
        for s in &state.verified_sources {
            sources.push_str(&format!(
                "- [{}] {} ({}). {}\n",
                s.id,
                s.title,
                s.year.map_or("n.d.".to_string(), |y| y.to_string()),
                s.excerpt
            ));
        }
        if sources.is_empty() {
            sources.push_str("(no verified sources; write a cautious overview)\n");
        }

        let mut contradictions = String::new();
        for c in &state.contradictions {
            contradictions.push_str(&format!("- {:?}: {}\n", c.severity, c.description));
        }

        let mut prompt = format!(
            "You are an academic writer synthesizing a research paper.\n\
             \n\
             TOPIC: {}\n\
             REQUIREMENTS: {}\n\
             \n\
             VERIFIED SOURCES\n\
             ----------------\n\
             {sources}",
            state.topic, state.requirements
        );

        if !contradictions.is_empty() {
            prompt.push_str(&format!(
                "\nCONTRADICTIONS TO ADDRESS\n-------------------------\n{contradictions}"
            ));
        }

        if self.redo {
            prompt.push_str(&format!(
                "\nPREVIOUS DRAFT (low confidence; rework its weak areas)\n\
                 ------------------------------------------------------\n{}\n",
                state.draft
            ));
        } else if !state.review_feedback.is_empty() {
            prompt.push_str(&format!(
                "\nREVIEWER FEEDBACK TO ADDRESS\n----------------------------\n{}\n{}\n\
                 \nPREVIOUS DRAFT\n--------------\n{}\n",
                state.review_feedback,
                state
                    .issues
                    .iter()
                    .map(|i| format!("- {i}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
                state.draft
            ));
        }

        prompt.push_str(
            "\nWrite a complete draft with a 7-section structure and a references \
             section citing the sources by id.\n\
             \n\
             Return ONLY a JSON object:\n\
             {\"outline\": [\"section 1\", ...], \"draft\": \"full markdown paper\", \
             \"confidence\": 0.0}\n\
             `confidence` is your 0.0-1.0 self-assessment of how well the \
             sources support the draft.",
        );
        prompt
    }
}

impl ResearchNode for SynthesizerNode {
    fn name(&self) -> NodeName {
        if self.redo {
            NodeName::SynthesizerRedo
        } else {
            NodeName::Synthesizer
        }
    }

    async fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> Result<NodeOutput, LlmError> {
        let prompt = self.prompt(state);
        let response = generator
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt: prompt.clone(),
                max_tokens: 8000,
                temperature: Some(0.7),
            })
            .await?;

        let (draft, outline, confidence) =
            match parse::parse_json::<DraftPayload>(&response.content) {
                Ok(payload) => {
                    let confidence = payload
                        .confidence
                        .filter(|c| c.is_finite())
                        .unwrap_or(FALLBACK_CONFIDENCE);
                    let outline = if payload.outline.is_empty() {
                        default_outline()
                    } else {
                        payload.outline
                    };
                    (payload.draft, outline, confidence)
                }
                Err(_) => {
                    // Treat the whole response as the draft body.
                    tracing::warn!("synthesizer output unusable as JSON; using raw text as draft");
                    (
                        response.content.clone(),
                        default_outline(),
                        FALLBACK_CONFIDENCE,
                    )
                }
            };

        tracing::info!(
            redo = self.redo,
            confidence,
            draft_chars = draft.len(),
            "synthesis complete"
        );

        let preview = summarize(&draft);
        Ok(NodeOutput {
            update: StateUpdate::Draft {
                draft,
                outline,
                confidence,
            },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: preview,
        })
    }
}
