use async_trait::async_trait;
use ollama_rs::{generation::completion::request::GenerationRequest, Ollama};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::query::{FilterNode, FIELDS};

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("text generation failed: {0}")]
    Generation(String),
    #[error("no JSON object found in model response")]
    MalformedResponse,
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// The single capability the rest of the crate needs from a language model.
/// Injectable so the parse/validate pipeline is testable without a live
/// service.
#[async_trait]
pub(crate) trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, Error>;
}

pub(crate) struct OllamaGenerator {
    client: Ollama,
    model: String,
}

impl OllamaGenerator {
    pub(crate) fn new(model: &str) -> Self {
        Self {
            client: Ollama::default(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, Error> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|error| Error::Generation(error.to_string()))?;
        Ok(response.response)
    }
}

/// Prompt asking the model to turn a free-text goal into a filter tree. The
/// field and operator vocabulary is generated from the registry so the
/// prompt never drifts from what the validator accepts.
pub(crate) fn segment_prompt(text: &str) -> String {
    let fields = FIELDS
        .iter()
        .map(|(name, field_type)| format!("{name} ({field_type})"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a query builder translator. Fields: {fields}.\n\
         Operators: =, !=, <, <=, >, >=, contains, doesNotContain.\n\
         Convert this description into JSON: \
         {{\"combinator\": \"and|or\", \"rules\": [{{\"field\": \"...\", \"operator\": \"...\", \"value\": \"...\"}}]}}\n\
         All values must be strings.\n\
         Description: \"{text}\"\n\
         Reply with only valid JSON."
    )
}

pub(crate) fn suggest_prompt(goal: &str) -> String {
    format!(
        "You are a marketing assistant. Given the campaign goal, generate 3 \
         concise email message variants.\n\
         Goal: \"{goal}\"\n\
         Return JSON: {{ \"suggestions\": [\"...\", \"...\", \"...\"] }}"
    )
}

/// Parses a model reply into a candidate filter tree. The result is
/// untrusted: callers must run it through [`crate::query::validate`] before
/// persisting or evaluating it.
pub(crate) fn parse_segment_reply(text: &str) -> Result<FilterNode, Error> {
    let json = extract_json(text)?;
    debug!("extracted candidate query: {json}");
    Ok(serde_json::from_str(&json)?)
}

#[derive(Deserialize)]
struct Suggestions {
    suggestions: Vec<String>,
}

pub(crate) fn parse_suggestions(text: &str) -> Result<Vec<String>, Error> {
    let json = extract_json(text)?;
    let parsed: Suggestions = serde_json::from_str(&json)?;
    Ok(parsed.suggestions)
}

/// Models wrap their JSON in prose or code fences; take the outermost
/// `{`..`}` span of the cleaned text.
fn extract_json(text: &str) -> Result<String, Error> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    let start = cleaned.find('{').ok_or(Error::MalformedResponse)?;
    let end = cleaned.rfind('}').ok_or(Error::MalformedResponse)?;
    if end < start {
        return Err(Error::MalformedResponse);
    }
    Ok(cleaned[start..=end].to_string())
}
