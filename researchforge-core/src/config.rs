//! Configuration system for ResearchForge.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/researchforge/config.toml` and/or
//! `.researchforge/config.toml` in the workspace directory.

use crate::error::ConfigError;
use crate::refinement::RefinementConfig;
use crate::types::MAX_TOTAL;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchForgeConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

/// Configuration for the reasoning provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only "gemini" is supported.
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 8192,
            temperature: 0.4,
        }
    }
}

/// Which evaluator scores drafts inside the refinement loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// Deterministic rule-based scoring.
    #[default]
    Heuristic,
    /// Scoring delegated to the reasoning provider.
    Llm,
}

impl std::fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluatorKind::Heuristic => write!(f, "heuristic"),
            EvaluatorKind::Llm => write!(f, "llm"),
        }
    }
}

/// Pipeline and refinement loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of papers discovery should return.
    pub search_breadth: usize,
    /// Score (0-10) at which a draft is accepted.
    pub quality_threshold: u8,
    /// Hard ceiling on revise/evaluate cycles.
    pub max_iterations: usize,
    /// Timeout applied to every external capability call.
    pub call_timeout_secs: u64,
    /// Minimum word count for a synthesized draft.
    pub min_draft_words: usize,
    pub evaluator: EvaluatorKind,
    /// Treat an exhausted iteration budget as a failed run.
    pub strict: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_breadth: 5,
            quality_threshold: 8,
            max_iterations: 3,
            call_timeout_secs: 120,
            min_draft_words: 150,
            evaluator: EvaluatorKind::Heuristic,
            strict: false,
        }
    }
}

impl PipelineConfig {
    pub const MAX_SEARCH_BREADTH: usize = 25;

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_breadth == 0 || self.search_breadth > Self::MAX_SEARCH_BREADTH {
            return Err(ConfigError::Invalid {
                message: format!(
                    "pipeline.search_breadth must be in 1..={}, got {}",
                    Self::MAX_SEARCH_BREADTH,
                    self.search_breadth
                ),
            });
        }
        if self.quality_threshold > MAX_TOTAL {
            return Err(ConfigError::Invalid {
                message: format!(
                    "pipeline.quality_threshold must be in 0..={}, got {}",
                    MAX_TOTAL, self.quality_threshold
                ),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.max_iterations must be at least 1".to_string(),
            });
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.call_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn refinement(&self) -> RefinementConfig {
        RefinementConfig {
            quality_threshold: self.quality_threshold,
            max_iterations: self.max_iterations,
            call_timeout: self.call_timeout(),
        }
    }
}

/// Where finished reviews are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// Load configuration by merging all sources.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ResearchForgeConfig>,
) -> Result<ResearchForgeConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ResearchForgeConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "researchforge", "researchforge")
    {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".researchforge").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (RESEARCHFORGE_PIPELINE__MAX_ITERATIONS, etc.)
    figment = figment.merge(Env::prefixed("RESEARCHFORGE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
