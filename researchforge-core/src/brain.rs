//! Reasoning capability interface.
//!
//! Every stage, the LLM-backed evaluator, and the reviser talk to the hosted
//! model through [`ReasoningCapability`]: a prompt template id plus named
//! context fields in, free text out.

use crate::error::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Identifies which instruction set a request is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    PaperDiscovery,
    PaperAnalysis,
    Synthesis,
    Refinement,
    Evaluation,
}

impl PromptTemplate {
    pub fn id(&self) -> &'static str {
        match self {
            PromptTemplate::PaperDiscovery => "paper_discovery",
            PromptTemplate::PaperAnalysis => "paper_analysis",
            PromptTemplate::Synthesis => "synthesis",
            PromptTemplate::Refinement => "refinement",
            PromptTemplate::Evaluation => "evaluation",
        }
    }
}

/// Named values substituted into a prompt template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFields(BTreeMap<String, String>);

impl ContextFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The hosted language-reasoning capability.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Render `template` with `fields` and return the model's text output.
    async fn generate(
        &self,
        template: PromptTemplate,
        fields: &ContextFields,
    ) -> Result<String, CapabilityError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Await `fut`, mapping an elapsed `timeout` through `on_elapsed`.
pub async fn call_with_timeout<F, T, E>(
    timeout: Duration,
    fut: F,
    on_elapsed: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(timeout.as_secs())),
    }
}

/// A scripted reasoning capability for tests and offline runs.
///
/// Queued responses are returned in order; once the queue is empty the
/// fallback response (if any) is returned for every call.
pub struct MockReasoning {
    model: String,
    responses: Mutex<VecDeque<Result<String, CapabilityError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<(PromptTemplate, ContextFields)>>,
}

impl MockReasoning {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always answers with `text`.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Queue a text response for the next call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a failure for the next call.
    pub fn queue_error(&self, error: CapabilityError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Templates requested so far, in call order.
    pub fn templates_called(&self) -> Vec<PromptTemplate> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Fields passed with the most recent call using `template`.
    pub fn last_fields(&self, template: PromptTemplate) -> Option<ContextFields> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, _)| *t == template)
            .map(|(_, f)| f.clone())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockReasoning {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningCapability for MockReasoning {
    async fn generate(
        &self,
        template: PromptTemplate,
        fields: &ContextFields,
    ) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push((template, fields.clone()));
        let queued = self.responses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| CapabilityError::InvalidResponse {
                    message: format!("no mock response queued for {}", template.id()),
                }),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
