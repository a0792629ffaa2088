//! Error types for the ResearchForge core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the reasoning capability, the refinement capabilities, stage
//! executors, tool adapters, configuration, and the pipeline as a whole.

use crate::context::RunContext;
use crate::stages::StageName;
use crate::types::{ArtifactKind, ScoreInvariantError};

/// Top-level error type for the ResearchForge core library.
#[derive(Debug, thiserror::Error)]
pub enum ResearchForgeError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Reasoning error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by the external reasoning capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },
}

/// Failures reported by a draft evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Evaluator output could not be parsed: {message}")]
    Unparseable { message: String },

    #[error("Evaluator rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Evaluation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Evaluator backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Inconsistent score report: {0}")]
    InconsistentReport(#[from] ScoreInvariantError),
}

/// Failures reported by a draft reviser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviserError {
    #[error("Revision timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Revision rejected: {message}")]
    Rejected { message: String },
}

/// Failures raised by a stage executor. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Discovery returned no papers")]
    NoPapers,

    #[error("Required {artifact} artifact is missing from the run context")]
    MissingInput { artifact: ArtifactKind },

    #[error("Reasoning output did not match the expected shape: {message}")]
    InvalidResponse { message: String },

    #[error("Synthesized draft is empty")]
    EmptyDraft,

    #[error("Synthesized draft has {words} words, minimum is {minimum}")]
    DraftTooShort { words: usize, minimum: usize },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Failures from tool adapters (search, PDF, citation).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool '{tool}' request failed: {message}")]
    Request { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("Tool '{tool}' returned unusable content: {message}")]
    InvalidContent { tool: String, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Unsupported reasoning provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors surfaced by the pipeline orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Research topic must not be empty")]
    InvalidTopic,

    #[error("{stage} stage failed: {cause}")]
    StageFailure {
        stage: StageName,
        #[source]
        cause: StageError,
        /// Partial run state kept for diagnostics; never passed downstream.
        context: Box<RunContext>,
    },

    #[error("Evaluator failed: {reason}")]
    EvaluatorFailure { reason: String },

    #[error("Reviser failed: {reason}")]
    ReviserFailure { reason: String },

    #[error("Refinement budget of {max_iterations} iterations exhausted (best score {best_total}/10)")]
    BudgetExhausted { max_iterations: usize, best_total: u8 },

    #[error("Run cancelled before {phase}")]
    CancellationRequested {
        phase: String,
        /// Artifacts recorded before the cancel was observed.
        context: Box<RunContext>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Partial run context retained by a stage failure or cancellation.
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            PipelineError::StageFailure { context, .. }
            | PipelineError::CancellationRequested { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The failing stage, if this is a stage failure.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            PipelineError::StageFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// A type alias for results using the top-level `ResearchForgeError`.
pub type Result<T> = std::result::Result<T, ResearchForgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Criterion;

    #[test]
    fn test_error_display_capability() {
        let err = ResearchForgeError::Capability(CapabilityError::Timeout { timeout_secs: 30 });
        assert_eq!(err.to_string(), "Reasoning error: Request timed out after 30s");
    }

    #[test]
    fn test_error_display_stage_failure() {
        let err = PipelineError::StageFailure {
            stage: StageName::Discovery,
            cause: StageError::NoPapers,
            context: Box::new(RunContext::new("graph neural networks")),
        };
        assert_eq!(
            err.to_string(),
            "discovery stage failed: Discovery returned no papers"
        );
        assert_eq!(err.stage(), Some(StageName::Discovery));
        assert_eq!(err.context().map(|c| c.topic()), Some("graph neural networks"));
    }

    #[test]
    fn test_stage_error_from_capability() {
        let err: StageError = CapabilityError::RateLimited {
            retry_after_secs: 30,
        }
        .into();
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 30s");
    }

    #[test]
    fn test_evaluator_error_from_invariant() {
        let err: EvaluatorError = ScoreInvariantError::OutOfRange {
            criterion: Criterion::Clarity,
            value: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Inconsistent score report: clarity sub-score 3 is outside 0..=2"
        );
    }

    #[test]
    fn test_budget_exhausted_display() {
        let err = PipelineError::BudgetExhausted {
            max_iterations: 3,
            best_total: 6,
        };
        assert_eq!(
            err.to_string(),
            "Refinement budget of 3 iterations exhausted (best score 6/10)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ResearchForgeError = io_err.into();
        assert!(matches!(err, ResearchForgeError::Io(_)));
    }

    #[test]
    fn test_tool_error_variants() {
        let err = ToolError::Timeout {
            tool: "pdf_fetch".into(),
            timeout_secs: 30,
        };
        assert_eq!(err.to_string(), "Tool 'pdf_fetch' timed out after 30s");
    }
}
