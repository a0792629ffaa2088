//! # ResearchForge Core
//!
//! Core library for the ResearchForge literature-review pipeline.
//! Provides the pipeline orchestrator, stage executors, the refinement loop
//! controller, the reasoning capability interface (brain), tool adapter
//! traits, configuration, and fundamental types.

pub mod brain;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod refinement;
pub mod stages;
pub mod tools;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{ContextFields, MockReasoning, PromptTemplate, ReasoningCapability};
pub use config::{EvaluatorKind, LlmConfig, OutputConfig, PipelineConfig, ResearchForgeConfig};
pub use context::RunContext;
pub use error::{
    CapabilityError, ConfigError, EvaluatorError, PipelineError, ResearchForgeError, Result,
    ReviserError, StageError, ToolError,
};
pub use output::ReviewWriter;
pub use pipeline::{PipelineCallback, PipelineOrchestrator, RunOutcome};
pub use providers::create_reasoning;
pub use refinement::{
    Evaluator, HeuristicEvaluator, LlmEvaluator, LlmReviser, LoopState, NoOpCallback,
    RefinementCallback, RefinementConfig, RefinementController, Reviser, TerminationReason,
};
pub use stages::StageName;
pub use tools::{CitationFormat, DiscoverySearch, FormattedCitation, PdfDocument, PdfFetch, Toolbox};
pub use types::{AnalysisBundle, Artifact, ArtifactKind, Criterion, Draft, Paper, PaperAnalysis, ScoreReport};
