//! Shared fakes for node tests.

use paperforge_types::llm::{GenerateRequest, GenerateResponse, LlmError, Usage};

use crate::llm::TextGenerator;

/// Generator that returns one canned response for every call.
pub struct SingleResponseGenerator {
    content: String,
}

impl SingleResponseGenerator {
    pub fn json(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Prose output, as from a model that ignored the format instructions.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

impl TextGenerator for SingleResponseGenerator {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        Ok(GenerateResponse {
            content: self.content.clone(),
            model: request.model.clone(),
            usage: Some(Usage {
                input_tokens: 200,
                output_tokens: 100,
            }),
        })
    }
}
