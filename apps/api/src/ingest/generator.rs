use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ingest::prompts::{build_structure_prompt, STRUCTURE_SYSTEM};
use crate::llm_client::prompts::json_system;
use crate::llm_client::{LlmClient, LlmError};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("no usable answer: {0}")]
    Unusable(String),
}

/// Produces a structured-resume candidate from raw text. The output is untrusted
/// and is validated against the target schema by the caller.
#[async_trait]
pub trait ResumeGenerator: Send + Sync {
    async fn generate(&self, text: &str, schema: &Value) -> Result<Value, GenerateError>;
}

pub struct LlmResumeGenerator {
    llm: LlmClient,
}

impl LlmResumeGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ResumeGenerator for LlmResumeGenerator {
    async fn generate(&self, text: &str, schema: &Value) -> Result<Value, GenerateError> {
        let prompt = build_structure_prompt(text, schema);
        let system = json_system(STRUCTURE_SYSTEM);
        debug!("Requesting structured resume for {} chars of text", text.len());
        let candidate = self.llm.call_json::<Value>(&prompt, &system).await?;
        if !candidate.is_object() {
            return Err(GenerateError::Unusable(
                "model answered with a non-object JSON value".to_string(),
            ));
        }
        Ok(candidate)
    }
}
