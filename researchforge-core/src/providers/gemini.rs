//! Google Gemini API provider implementation.
//!
//! Implements [`ReasoningCapability`] on top of the `generateContent`
//! endpoint. Rendered prompts map onto the request like this:
//! - the template instruction becomes the top-level `system_instruction`
//! - the rendered request body is the single `user` turn
//! - auth is the `?key=API_KEY` query parameter

use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability};
use crate::config::LlmConfig;
use crate::error::{CapabilityError, ConfigError};
use crate::prompts::{self, RenderedPrompt};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Transport-level timeout. Callers apply their own, usually shorter, timeout.
const HTTP_TIMEOUT_SECS: u64 = 300;

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// Uses `config.api_key` if set, otherwise reads the environment variable
    /// named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: config.api_key_env.clone(),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build the JSON request body for the Gemini API.
    fn build_request_body(&self, prompt: &RenderedPrompt) -> Value {
        serde_json::json!({
            "system_instruction": {
                "parts": [{"text": prompt.system}]
            },
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt.user}]
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
            },
        })
    }

    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    /// Concatenate the text parts of the first candidate.
    fn parse_response(body: &Value) -> Result<String, CapabilityError> {
        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| CapabilityError::InvalidResponse {
                message: "Missing or empty 'candidates' array in response".to_string(),
            })?;

        if candidate["finishReason"].as_str() == Some("SAFETY") {
            return Err(CapabilityError::InvalidResponse {
                message: "Response blocked by safety filters".to_string(),
            });
        }

        let parts = candidate["content"]["parts"].as_array().ok_or_else(|| {
            CapabilityError::InvalidResponse {
                message: "Missing 'parts' array in candidate content".to_string(),
            }
        })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(CapabilityError::InvalidResponse {
                message: "Candidate contained no text".to_string(),
            });
        }
        Ok(text)
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> CapabilityError {
        match status.as_u16() {
            401 | 403 => CapabilityError::Unavailable {
                message: "Authentication failed for Gemini".to_string(),
            },
            429 => CapabilityError::RateLimited {
                retry_after_secs: 30,
            },
            408 | 504 => CapabilityError::Timeout {
                timeout_secs: HTTP_TIMEOUT_SECS,
            },
            _ => CapabilityError::Unavailable {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    fn map_transport_error(err: reqwest::Error) -> CapabilityError {
        if err.is_timeout() {
            CapabilityError::Timeout {
                timeout_secs: HTTP_TIMEOUT_SECS,
            }
        } else {
            CapabilityError::Unavailable {
                message: format!("Request to Gemini API failed: {}", err),
            }
        }
    }
}

#[async_trait]
impl ReasoningCapability for GeminiProvider {
    async fn generate(
        &self,
        template: PromptTemplate,
        fields: &ContextFields,
    ) -> Result<String, CapabilityError> {
        let prompt =
            prompts::render(template, fields).map_err(|e| CapabilityError::Unavailable {
                message: format!("Failed to render {} prompt: {}", template.id(), e),
            })?;
        let body = self.build_request_body(&prompt);

        debug!(
            model = self.model.as_str(),
            template = template.id(),
            prompt_chars = prompt.user.len(),
            "Sending Gemini generate request"
        );

        let response = self
            .client
            .post(self.endpoint_url())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| CapabilityError::InvalidResponse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| CapabilityError::InvalidResponse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
