// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! proofbench CLI - main binary entry point

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use proofbench::cache::FsStore;
use proofbench::context::ContextBuilder;
use proofbench::core::Ablation;
use proofbench::error::ConfigError;
use proofbench::llm::retry::RetryPolicy;
use proofbench::llm::{prompt, ModelClient, OpenAiProvider};
use proofbench::project::CoqProject;
use proofbench::runner::{self, Runner};
use proofbench::verify::{CoqcChecker, Verifier};
use proofbench::{Extractor, RunConfig};

mod output;

use output::{ExtractionReport, OutputFormat, OutputFormatter};

/// Evaluate language-model generated Coq proofs with coqc
#[derive(Parser)]
#[command(name = "proofbench")]
#[command(version, about, long_about = None)]
#[command(author = "Proofbench Project Team")]
struct Cli {
    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a project
    Run {
        /// Project directory or _CoqProject file
        project: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Extract declarations and report on the dependency graph
    Extract {
        /// Project directory or _CoqProject file
        project: PathBuf,

        /// Number of external references to list
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Render the prompt of one declaration
    Show {
        /// Project directory or _CoqProject file
        project: PathBuf,

        /// Declaration name, qualified or short
        name: String,

        /// Omit the statements of dependencies
        #[arg(long)]
        no_dependencies: bool,

        /// Omit the surrounding file content
        #[arg(long)]
        no_lines: bool,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print stored summaries of earlier runs
    Stats {
        /// Logs directory of the runs
        #[arg(default_value = "logs")]
        logs_dir: PathBuf,
    },

    /// List known models
    ListModels {
        /// Configuration file with additional models
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunOptions {
    /// Configuration file (default: ./proofbench.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for objects, caches and results
    #[arg(long, env = "PROOFBENCH_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Comma-separated model ids
    #[arg(short, long, value_delimiter = ',')]
    models: Vec<String>,

    /// Worker count
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Omit the statements of dependencies from prompts
    #[arg(long)]
    no_dependencies: bool,

    /// Omit the surrounding file content from prompts
    #[arg(long)]
    no_lines: bool,

    /// Compiler feedback rounds after a failed attempt
    #[arg(long)]
    feedback_rounds: Option<u32>,

    /// Compiler timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Build proof objects and estimate token usage without calling a model
    #[arg(long)]
    dry_run: bool,

    /// Rebuild proof objects even if saved ones exist
    #[arg(long)]
    reconstruct_objects: bool,

    /// Re-run units that already have a stored result
    #[arg(long)]
    force: bool,
}

impl RunOptions {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(dir) = &self.logs_dir {
            config.run.logs_dir = dir.clone();
        }
        if !self.models.is_empty() {
            config.run.models = self.models.clone();
        }
        if let Some(threads) = self.threads {
            config.run.threads = threads;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        config.run.no_dependencies |= self.no_dependencies;
        config.run.no_lines |= self.no_lines;
        if let Some(rounds) = self.feedback_rounds {
            config.verify.feedback_rounds = rounds;
        }
        if let Some(timeout) = self.timeout {
            config.verify.timeout_secs = timeout;
        }
        config.run.force |= self.force;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    let formatter = OutputFormatter::new(cli.format);

    match cli.command {
        Commands::Run { project, options } => run_command(&project, options, &formatter).await,
        Commands::Extract { project, top } => extract_command(&project, top, &formatter),
        Commands::Show {
            project,
            name,
            no_dependencies,
            no_lines,
            config,
        } => show_command(
            &project,
            &name,
            Ablation::from_flags(no_dependencies, no_lines),
            config.as_deref(),
            &formatter,
        ),
        Commands::Stats { logs_dir } => stats_command(&logs_dir, &formatter),
        Commands::ListModels { config } => list_models_command(config.as_deref(), &formatter),
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::{fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("proofbench=debug,info")
    } else {
        EnvFilter::new("proofbench=info,warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_command(project: &Path, options: RunOptions, formatter: &OutputFormatter) -> Result<()> {
    let mut config = RunConfig::load(options.config.as_deref())?;
    options.apply(&mut config);
    config.validate()?;

    let project = CoqProject::open(project)?;
    let logs_dir = config.run.logs_dir.clone();
    std::fs::create_dir_all(&logs_dir).map_err(|e| ConfigError::LogsDir {
        path: logs_dir.clone(),
        reason: e.to_string(),
    })?;
    info!("Project {} -> {}", project.root.display(), logs_dir.display());

    let objects = runner::prepare_objects(&config, &project, options.reconstruct_objects)?;

    let coq_version = match &config.llm.coq_version {
        Some(version) => version.clone(),
        None => prompt::detect_coq_version(&config.verify.coqc).await,
    };
    let system_prompt = prompt::system_prompt(&coq_version);

    if options.dry_run {
        let estimate = runner::estimate_tokens(
            &objects,
            &system_prompt,
            config.run.models.len(),
            config.llm.max_tokens,
        );
        return formatter.estimate(&estimate);
    }

    let provider = OpenAiProvider::from_env(&config.llm)?;
    let cache_dir = config.cache_dir();
    let responses = FsStore::open(cache_dir.join("responses"))?;
    let results = FsStore::open(cache_dir.join("results"))?;
    let client = ModelClient::new(
        Arc::new(provider),
        Arc::new(responses),
        system_prompt,
        RetryPolicy::from_settings(&config.llm),
    );
    let checker = CoqcChecker::new(&project, &config.verify);
    let verifier = Verifier::new(Arc::new(checker), project.root.clone());

    let progress = if formatter.is_json() {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };
    let runner = Runner::new(config, Arc::new(client), Arc::new(verifier), Arc::new(results))
        .with_progress(progress);

    let report = runner.run(objects, interrupted()).await?;
    formatter.run_report(&report)
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn extract_command(project: &Path, top: usize, formatter: &OutputFormatter) -> Result<()> {
    let project = CoqProject::open(project)?;
    let extraction = Extractor::new(project).extract()?;

    let mut external: HashMap<&str, usize> = HashMap::new();
    for decl in &extraction.declarations {
        for name in &decl.external_refs {
            *external.entry(name.as_str()).or_insert(0) += 1;
        }
    }
    let mut external: Vec<(String, usize)> = external
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    external.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    external.truncate(top);

    let report = ExtractionReport {
        files: extraction.files.len(),
        declarations: extraction.declarations.len(),
        provable: extraction.provable().count(),
        excluded: extraction
            .declarations
            .iter()
            .filter(|d| extraction.is_excluded(d.id))
            .count(),
        failures: extraction.failures.iter().map(|f| f.to_string()).collect(),
        external_refs: external,
    };
    formatter.extraction(&report)
}

fn show_command(
    project: &Path,
    name: &str,
    ablation: Ablation,
    config: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = RunConfig::load(config)?;
    let project = CoqProject::open(project)?;
    let extraction = Extractor::new(project).extract()?;
    let decl = extraction
        .find(name)
        .ok_or_else(|| anyhow!("no declaration named `{}`", name))?;
    if !decl.is_provable() {
        formatter.warning(&format!(
            "{} is not an evaluation target (kind {}, no complete proof)",
            decl.qualified_name, decl.kind
        ))?;
    }

    let object = ContextBuilder::new(&extraction, config.context).build(decl, ablation);
    if formatter.is_json() {
        return formatter.json(&object);
    }
    formatter.header(&format!("{} [{}]", decl.qualified_name, ablation))?;
    formatter.info(&format!("fingerprint {}", object.fingerprint.short()))?;
    formatter.info(&format!(
        "{} dependencies, {} notations, ~{} prompt tokens",
        object.dependencies.len(),
        object.notations.len(),
        prompt::estimate_tokens(&object.context)
    ))?;
    println!("\n{}", object.context);
    Ok(())
}

fn stats_command(logs_dir: &Path, formatter: &OutputFormatter) -> Result<()> {
    let summaries = runner::read_summaries(logs_dir)
        .with_context(|| format!("Failed to read summaries under {}", logs_dir.display()))?;
    if summaries.is_empty() {
        return formatter.warning(&format!("No summaries under {}", logs_dir.display()));
    }
    formatter.summaries(&summaries)
}

fn list_models_command(config: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let config = RunConfig::load(config)?;
    formatter.models(&config.all_models())
}

/// Progress bar with standard styling
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_options_override_config() {
        let cli = Cli::parse_from([
            "proofbench",
            "run",
            "proj",
            "--models",
            "gpt-4o,o4-mini",
            "-j",
            "3",
            "--no-lines",
            "--feedback-rounds",
            "2",
            "--temperature",
            "0.5",
        ]);
        let Commands::Run { options, .. } = cli.command else {
            panic!("expected run");
        };
        let mut config = RunConfig::default();
        options.apply(&mut config);
        assert_eq!(config.run.models, vec!["gpt-4o", "o4-mini"]);
        assert_eq!(config.run.threads, 3);
        assert!(config.run.no_lines && !config.run.no_dependencies);
        assert_eq!(config.verify.feedback_rounds, 2);
        assert_eq!(config.llm.temperature, 0.5);
        assert!(config.validate().is_ok());
    }
}
