//! Researcher: collects candidate sources for one query.
//!
//! Five researcher branches run concurrently, each owning one planner query.
//! The same node type also serves as the fallback research pass taken when
//! verification finds the initial harvest too weak; the fallback broadens
//! the query and namespaces its source ids separately.
//!
//! Sources are model-suggested, not fetched from a live index; the verifier
//! downstream is what separates usable entries from hallucinated ones.

use paperforge_types::llm::{GenerateRequest, LlmError};
use paperforge_types::research::{ResearchState, Source, StateUpdate};
use serde::Deserialize;

use crate::llm::TextGenerator;
use crate::workflow::node::{summarize, NodeName, NodeOutput, ResearchNode};

use super::parse;

/// Sources requested per research pass.
const SOURCES_PER_QUERY: usize = 3;

enum Assignment {
    /// One of the parallel fan-out branches, bound to `queries[branch]`.
    Branch(usize),
    /// The one-shot fallback pass with a broadened query.
    Fallback,
}

pub struct ResearcherNode {
    model: String,
    assignment: Assignment,
}

#[derive(Deserialize)]
struct SourcePayload {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: AuthorsField,
    #[serde(default)]
    publication: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
}

/// Models return authors as either a comma-joined string or a list.
#[derive(Deserialize, Default)]
#[serde(untagged)]
enum AuthorsField {
    #[default]
    Missing,
    One(String),
    List(Vec<String>),
}

impl AuthorsField {
    fn into_vec(self) -> Vec<String> {
        match self {
            AuthorsField::Missing => Vec::new(),
            AuthorsField::One(joined) => joined
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            AuthorsField::List(list) => list,
        }
    }
}

impl ResearcherNode {
    pub fn branch(branch: usize, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            assignment: Assignment::Branch(branch),
        }
    }

    pub fn fallback(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            assignment: Assignment::Fallback,
        }
    }

    fn query(&self, state: &ResearchState) -> String {
        match self.assignment {
            Assignment::Branch(branch) => state
                .queries
                .get(branch)
                .cloned()
                .unwrap_or_else(|| state.topic.clone()),
            // Broader angle than the original queries, since those came up
            // short the first time.
            Assignment::Fallback => format!("{} survey review state of the art", state.topic),
        }
    }

    fn id_prefix(&self) -> String {
        match self.assignment {
            Assignment::Branch(branch) => format!("src-{branch}"),
            Assignment::Fallback => "src-retry".to_string(),
        }
    }

    fn prompt(query: &str) -> String {
        format!(
            "You are a research source evaluator.\n\
             \n\
             Suggest {SOURCES_PER_QUERY} high-quality academic sources for this search query.\n\
             \n\
             SEARCH QUERY: {query}\n\
             \n\
             Return ONLY a JSON array:\n\
             [\n\
               {{\"title\": \"...\", \"authors\": \"Author1, Author2\", \"publication\": \"...\", \
             \"year\": 2024, \"doi\": \"10.xxxx/xxxxx\", \"url\": \"https://...\", \
             \"excerpt\": \"one-sentence key claim\"}}\n\
             ]"
        )
    }
}

impl ResearchNode for ResearcherNode {
    fn name(&self) -> NodeName {
        match self.assignment {
            Assignment::Branch(branch) => NodeName::Researcher(branch),
            Assignment::Fallback => NodeName::RetryResearch,
        }
    }

    async fn run<G: TextGenerator>(
        &self,
        state: &ResearchState,
        generator: &G,
    ) -> Result<NodeOutput, LlmError> {
        let query = self.query(state);
        let prompt = Self::prompt(&query);
        let response = generator
            .generate(&GenerateRequest {
                model: self.model.clone(),
                prompt: prompt.clone(),
                max_tokens: 1500,
                temperature: Some(0.3),
            })
            .await?;

        let prefix = self.id_prefix();
        let sources = match parse::parse_json::<Vec<SourcePayload>>(&response.content) {
            Ok(payloads) => payloads
                .into_iter()
                .take(SOURCES_PER_QUERY)
                .enumerate()
                .map(|(i, p)| Source {
                    id: format!("{prefix}-{i}"),
                    title: if p.title.is_empty() {
                        "Unknown".to_string()
                    } else {
                        p.title
                    },
                    authors: p.authors.into_vec(),
                    publication: p.publication,
                    year: p.year,
                    doi: p.doi.filter(|d| !d.is_empty()),
                    url: p.url.filter(|u| !u.is_empty()),
                    credibility: None,
                    verified: false,
                    excerpt: p.excerpt.unwrap_or_else(|| format!("Query: {query}")),
                    relevance: 0.8,
                })
                .collect(),
            Err(_) => {
                // An empty harvest is recoverable downstream; the quality
                // gate routes through the fallback pass if too little
                // survives verification.
                tracing::warn!(
                    node = %self.name(),
                    query = query.as_str(),
                    "researcher output unusable; contributing no sources"
                );
                Vec::new()
            }
        };

        let found = sources.len();
        Ok(NodeOutput {
            update: StateUpdate::Sources { sources },
            usage: response.usage,
            model: response.model,
            input_summary: summarize(&prompt),
            output_summary: summarize(&format!("{found} sources for query: {query}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::SingleResponseGenerator;
    use uuid::Uuid;

    fn state_with_queries() -> ResearchState {
        let mut state = ResearchState::new(Uuid::now_v7(), "fusion energy", "");
        state.queries = (0..5).map(|i| format!("query {i}")).collect();
        state
    }

    const SOURCES_JSON: &str = r#"[
        {"title": "Tokamak advances", "authors": "A. One, B. Two", "publication": "Journal of Fusion", "year": 2024, "doi": "10.1/a", "url": "https://x", "excerpt": "Net gain achieved."},
        {"title": "Stellarator design", "authors": ["C. Three"], "publication": "Plasma Reports", "year": 2019}
    ]"#;

    #[tokio::test]
    async fn test_branch_namespaces_source_ids() {
        let generator = SingleResponseGenerator::json(SOURCES_JSON);
        let output = ResearcherNode::branch(2, "research-model")
            .run(&state_with_queries(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Sources { sources } => {
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[0].id, "src-2-0");
                assert_eq!(sources[1].id, "src-2-1");
                assert_eq!(sources[0].authors, vec!["A. One", "B. Two"]);
                assert!(sources.iter().all(|s| s.credibility.is_none()));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_pass_uses_retry_namespace_and_broad_query() {
        let generator = SingleResponseGenerator::json(SOURCES_JSON);
        let node = ResearcherNode::fallback("research-model");
        assert_eq!(node.name(), NodeName::RetryResearch);
        let output = node.run(&state_with_queries(), &generator).await.unwrap();
        match output.update {
            StateUpdate::Sources { sources } => {
                assert_eq!(sources[0].id, "src-retry-0");
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(output.output_summary.contains("survey review"));
    }

    #[tokio::test]
    async fn test_unparsable_output_contributes_nothing() {
        let generator = SingleResponseGenerator::text("no sources today");
        let output = ResearcherNode::branch(0, "research-model")
            .run(&state_with_queries(), &generator)
            .await
            .unwrap();
        match output.update {
            StateUpdate::Sources { sources } => assert!(sources.is_empty()),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_query_falls_back_to_topic() {
        let state = ResearchState::new(Uuid::now_v7(), "fusion energy", "");
        let node = ResearcherNode::branch(4, "research-model");
        assert_eq!(node.query(&state), "fusion energy");
    }
}
