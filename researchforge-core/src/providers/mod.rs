//! Reasoning provider implementations.

pub mod gemini;

pub use gemini::GeminiProvider;

use crate::brain::ReasoningCapability;
use crate::config::LlmConfig;
use crate::error::ConfigError;
use std::sync::Arc;

/// Build the reasoning capability selected by `config.provider`.
pub fn create_reasoning(config: &LlmConfig) -> Result<Arc<dyn ReasoningCapability>, ConfigError> {
    match config.provider.to_lowercase().as_str() {
        "gemini" | "google" => {
            let provider = GeminiProvider::new(config)?;
            tracing::info!(model = %config.model, "Using Gemini reasoning provider");
            Ok(Arc::new(provider))
        }
        other => Err(ConfigError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            create_reasoning(&config),
            Err(ConfigError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_gemini_with_explicit_key() {
        let config = LlmConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let reasoning = create_reasoning(&config).unwrap();
        assert_eq!(reasoning.model_name(), "gemini-2.0-flash");
    }
}
