//! ResearchForge CLI: run a literature review for a topic from the terminal.

mod progress;

use anyhow::Context;
use clap::Parser;
use progress::ConsoleProgress;
use researchforge_core::{PipelineOrchestrator, ResearchForgeConfig, ReviewWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Topic used by `--test`.
const SAMPLE_TOPIC: &str = "attention mechanisms in transformer models";
/// Search breadth used by `--test`.
const SAMPLE_BREADTH: usize = 2;

/// ResearchForge: discover, analyse, synthesize, and refine a literature review
#[derive(Parser, Debug)]
#[command(name = "researchforge", version, about, long_about = None)]
struct Cli {
    /// Research topic (words are joined with spaces)
    #[arg(required_unless_present = "test")]
    topic: Vec<String>,

    /// Run against a small sample topic
    #[arg(long, conflicts_with = "topic")]
    test: bool,

    /// Workspace directory (holds .researchforge/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory for the finished review (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat an exhausted refinement budget as a failure
    #[arg(long)]
    strict: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn topic(&self) -> String {
        if self.test {
            SAMPLE_TOPIC.to_string()
        } else {
            self.topic.join(" ")
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut ResearchForgeConfig) {
        if self.test {
            config.pipeline.search_breadth = SAMPLE_BREADTH;
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if self.strict {
            config.pipeline.strict = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "researchforge", "researchforge")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "researchforge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = researchforge_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply(&mut config);

    let topic = cli.topic();
    let reasoning = researchforge_core::create_reasoning(&config.llm)
        .context("failed to initialise the reasoning provider")?;
    let tools = researchforge_tools::default_toolbox().context("failed to initialise tools")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; stopping after the current step");
                cancel.cancel();
            }
        });
    }

    let progress = Arc::new(ConsoleProgress::new(
        config.pipeline.quality_threshold,
        cli.quiet,
    ));
    let orchestrator = PipelineOrchestrator::new(config.pipeline.clone(), reasoning, tools)
        .with_callback(progress)
        .with_cancellation(cancel);

    info!(topic = %topic, "Starting literature review");
    let outcome = match orchestrator.run(&topic).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Review failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let path = ReviewWriter::new(&config.output.dir)
        .write(&outcome)
        .with_context(|| format!("failed to write review to {}", config.output.dir.display()))?;

    println!("Termination: {}", outcome.termination_reason());
    if let Some(report) = outcome.final_report() {
        println!("Final score: {}/10", report.total);
    }
    println!("Review written to {}", path.display());

    match outcome.failure(config.pipeline.strict) {
        Some(failure) => {
            eprintln!("Review incomplete: {}", failure);
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_words_are_joined() {
        let cli = Cli::try_parse_from(["researchforge", "graph", "neural", "networks"]).unwrap();
        assert_eq!(cli.topic(), "graph neural networks");
        assert!(!cli.test);
    }

    #[test]
    fn test_topic_required_without_test_flag() {
        assert!(Cli::try_parse_from(["researchforge"]).is_err());
        assert!(Cli::try_parse_from(["researchforge", "--test", "extra"]).is_err());
    }

    #[test]
    fn test_sample_run_overrides() {
        let cli = Cli::try_parse_from(["researchforge", "--test", "-o", "out", "--strict"]).unwrap();
        assert_eq!(cli.topic(), SAMPLE_TOPIC);

        let mut config = ResearchForgeConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.pipeline.search_breadth, SAMPLE_BREADTH);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert!(config.pipeline.strict);
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::try_parse_from(["researchforge", "-vv", "-q", "topic"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
    }
}
