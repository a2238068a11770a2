//! Verifier: scores source credibility and computes the quality gate input.
//!
//! Scores every source that has not been scored yet in one batch call.
//! Already-scored sources keep their score, so the re-verification pass
//! after the research fallback only touches the new arrivals.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, Source, StateUpdate};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

pub struct VerifierNode {
    model: String,
}

#[derive(Deserialize)]
struct VerificationPayload {
    #[serde(default)]
    scores: Vec<ScoreEntry>,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct ScoreEntry {
    id: String,
    score: f64,
}

impl VerifierNode {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// Metadata-based score used when the model gives nothing usable for a
    /// source: 0.5 base, boosted for a DOI, recency, and journal publication.
    pub fn heuristic_score(source: &Source) -> f64 {
        let mut score: f64 = 0.5;
        if source.doi.is_some() {
            score += 0.2;
        }
        if source.year.is_some_and(|y| y >= 2020) {
            score += 0.15;
        }
        if source.publication.to_lowercase().contains("journal") {
            score += 0.15;
        }
        score.min(1.0)
    }

    fn prompt(unscored: &[&Source]) -> String {
        let mut listing = String::new();
        for source in unscored {
            listing.push_str(&format!(
                "id: {}\ntitle: {}\nauthors: {}\npublication: {}\nyear: {}\ndoi: {}\n\n",
                source.id,
                source.title,
                source.authors.join(", "),
                source.publication,
                source.year.map_or("unknown".to_string(), |y| y.to_string()),
                source.doi.as_deref().unwrap_or("None"),
            ));
        }
        format!(
            "You are a meticulous research verifier.\n\
             \n\
             Score the credibility of each source below on a 0.0-1.0 scale.\n\
             - 0.9-1.0: peer-reviewed journal, recent, well cited\n\
             - 0.7-0.9: credible outlet with strong evidence\n\
             - 0.5-0.7: legitimate but lesser-known source\n\
             - 0.0-0.5: weak credibility or unverifiable\n\
             \n\
             SOURCES\n\
             -------\n\
             {listing}\
             Return ONLY a JSON object:\n\
             {{\"scores\": [{{\"id\": \"...\", \"score\": 0.0}}], \"notes\": \"one-line summary\"}}"
        )
    }
}

impl ResearchNode for VerifierNode {
    fn name(&self) -> NodeName {
        NodeName::Verifier
    }

    async fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> Result<NodeOutput, LlmError> {
        let unscored: Vec<&Source> = state
            .sources
            .iter()
            .filter(|s| s.credibility.is_none())
            .collect();

        if state.sources.is_empty() {
            // Nothing to verify; a zero quality score sends routing through
            // the research fallback.
            return Ok(NodeOutput {
                update: StateUpdate::Verification {
                    scores: Vec::new(),
                    quality: 0.0,
                    notes: "No sources to verify".to_string(),
                },
                usage: None,
                model: self.model.clone(),
                input_summary: String::new(),
                output_summary: "no sources".to_string(),
            });
        }

        let (scores, notes, usage, model, prompt) = if unscored.is_empty() {
            (
                Vec::new(),
                "All sources already scored".to_string(),
                None,
                self.model.clone(),
                String::new(),
            )
        } else {
            let prompt = Self::prompt(&unscored);
            let response = generator
                .generate(&GenerateRequest {
                    model: self.model.clone(),
                    prompt: prompt.clone(),
                    max_tokens: 2000,
                    temperature: Some(0.25),
                })
                .await?;

            let payload = parse::parse_json::<VerificationPayload>(&response.content);
            let (mut scores, notes) = match payload {
                Ok(p) => {
                    let scores: Vec<(String, f64)> = p
                        .scores
                        .into_iter()
                        .filter(|e| e.score.is_finite())
                        .map(|e| (e.id, e.score.clamp(0.0, 1.0)))
                        .collect();
                    (scores, p.notes)
                }
                Err(_) => {
                    tracing::warn!("verifier output unusable; scoring heuristically");
                    (Vec::new(), "Scored heuristically from metadata".to_string())
                }
            };

            // Any source the model skipped gets the metadata heuristic, so
            // every source leaves this node scored.
            for source in &unscored {
                if !scores.iter().any(|(id, _)| id == &source.id) {
                    scores.push((source.id.clone(), Self::heuristic_score(source)));
                }
            }

            (scores, notes, response.usage, response.model, prompt)
        };

        // Aggregate quality over every source, combining fresh scores with
        // ones written by an earlier pass.
        let total: f64 = state
            .sources
            .iter()
            .map(|s| {
                s.credibility.unwrap_or_else(|| {
                    scores
                        .iter()
                        .find(|(id, _)| id == &s.id)
                        .map_or(0.0, |(_, score)| *score)
                })
            })
            .sum();
        let quality = total / state.sources.len() as f64;

        let verified_projection = scores.iter().filter(|(_, s)| *s >= 0.7).count();
        tracing::info!(
            scored = scores.len(),
            verified = verified_projection,
            quality,
            "verification complete"
        );

        Ok(NodeOutput {
            update: StateUpdate::Verification {
                scores,
                quality,
                notes,
            },
            usage,
            model,
            input_summary: summarize(&prompt),
            output_summary: summarize(&format!("quality {quality:.2}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::SingleResponseGenerator;
    use uuid::Uuid;

    fn source(id: &str, doi: bool, year: Option<i32>, publication: &str) -> Source {
        Source {
            id: id.to_string(),
            title: "Title".to_string(),
            authors: vec!["A. Author".to_string()],
            publication: publication.to_string(),
            year,
            doi: doi.then(|| "10.1/x".to_string()),
            url: None,
            credibility: None,
            verified: false,
            excerpt: "claim".to_string(),
            relevance: 0.8,
        }
    }

    #[test]
    fn test_heuristic_score_components() {
        let strong = source("a", true, Some(2024), "Journal of Things");
        assert!((VerifierNode::heuristic_score(&strong) - 1.0).abs() < 1e-9);

        let weak = source("b", false, Some(2005), "Some Blog");
        assert!((VerifierNode::heuristic_score(&weak) - 0.5).abs() < 1e-9);

        let doi_only = source("c", true, None, "Some Blog");
        assert!((VerifierNode::heuristic_score(&doi_only) - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_scores_applied_and_quality_is_mean() {
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        state.apply(StateUpdate::Sources {
            sources: vec![
                source("src-0-0", true, Some(2024), "Journal"),
                source("src-1-0", false, None, "Blog"),
            ],
        });
        let generator = SingleResponseGenerator::json(
            r#"{"scores": [{"id": "src-0-0", "score": 0.9}, {"id": "src-1-0", "score": 0.3}], "notes": "1/2 verified"}"#,
        );
        let output = VerifierNode::new("verify-model")
            .run(&state, &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Verification { scores, quality, .. } => {
                assert_eq!(scores.len(), 2);
                assert!((quality - 0.6).abs() < 1e-9);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_output_scores_heuristically() {
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        state.apply(StateUpdate::Sources {
            sources: vec![source("src-0-0", true, Some(2024), "Journal of X")],
        });
        let generator = SingleResponseGenerator::text("cannot comply");
        let output = VerifierNode::new("verify-model")
            .run(&state, &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Verification { scores, quality, .. } => {
                assert_eq!(scores.len(), 1);
                assert!((scores[0].1 - 1.0).abs() < 1e-9);
                assert!((quality - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_already_scored_sources_are_not_rescored() {
        let mut state = ResearchState::new(Uuid::now_v7(), "topic", "");
        state.apply(StateUpdate::Sources {
            sources: vec![source("src-0-0", false, None, "Blog")],
        });
        state.apply(StateUpdate::Verification {
            scores: vec![("src-0-0".to_string(), 0.9)],
            quality: 0.9,
            notes: String::new(),
        });
        state.apply(StateUpdate::Sources {
            sources: vec![source("src-retry-0", false, None, "Blog")],
        });

        let generator = SingleResponseGenerator::json(
            r#"{"scores": [{"id": "src-retry-0", "score": 0.5}], "notes": ""}"#,
        );
        let output = VerifierNode::new("verify-model")
            .run(&state, &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Verification { scores, quality, .. } => {
                // Only the new source is in the fresh score set.
                assert_eq!(scores.len(), 1);
                assert_eq!(scores[0].0, "src-retry-0");
                // Quality averages old (0.9) and new (0.5).
                assert!((quality - 0.7).abs() < 1e-9);
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_sources_yields_zero_quality_without_calling() {
        let state = ResearchState::new(Uuid::now_v7(), "topic", "");
        let generator = SingleResponseGenerator::text("should not be used");
        let output = VerifierNode::new("verify-model")
            .run(&state, &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Verification { quality, .. } => assert_eq!(quality, 0.0),
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(output.usage.is_none());
    }
}
