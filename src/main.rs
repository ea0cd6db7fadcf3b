//! Nox CLI - workflow automation with `${{ }}` variables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use nox::action::ActionRegistry;
use nox::error::{FixSuggestion, NoxError};
use nox::provider::ClientVariableProvider;
use nox::resolver::{CacheResolver, EnvSecretResolver, FileSessionCache, SolutionResolver};
use nox::runtime::{RunStatus, WorkflowExecutor};
use nox::{NoxConfig, Workflow};

#[derive(Parser)]
#[command(name = "nox")]
#[command(about = "Nox - CLI workflow automation with ${{ }} variable resolution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to the workflow YAML file
        file: PathBuf,

        /// Solution file (YAML or JSON) behind `${{ solution.* }}`
        #[arg(short, long)]
        solution: Option<PathBuf>,

        /// Preset a variable (`name=value`, bare names land in `vars.*`)
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Task server for `run-at-server` steps
        #[arg(long)]
        server: Option<String>,

        /// Only print errors
        #[arg(short, long)]
        quiet: bool,
    },

    /// Validate a workflow file (parse only)
    Validate {
        /// Path to the workflow YAML file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            solution,
            vars,
            server,
            quiet,
        } => run_workflow(&file, solution.as_deref(), &vars, server, quiet).await,
        Commands::Validate { file } => validate_workflow(&file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

/// Split `name=value`; the name must be non-empty
fn parse_assignment(assignment: &str) -> Result<(&str, &str), NoxError> {
    match assignment.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(NoxError::InvalidAssignment {
            assignment: assignment.to_string(),
        }),
    }
}

async fn run_workflow(
    file: &Path,
    solution: Option<&Path>,
    vars: &[String],
    server: Option<String>,
    quiet: bool,
) -> Result<(), NoxError> {
    let config = NoxConfig::load()?.with_env();
    let workflow = Workflow::load(file).await?;
    let assignments = vars
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<Result<Vec<_>, _>>()?;

    let mut provider = ClientVariableProvider::new(&config)
        .with_secrets(Arc::new(EnvSecretResolver::new(config.secret_env_prefix.clone())));
    if let Some(path) = solution {
        provider = provider.with_solution(SolutionResolver::load(path)?);
    }
    let cache_path = config.cache_path();
    if cache_path.exists() {
        provider = provider.with_cache(CacheResolver::new(Arc::new(FileSessionCache::new(cache_path))));
    }

    let server_url = server.or_else(|| {
        workflow
            .server
            .is_none()
            .then(|| config.server_url.clone())
            .flatten()
    });

    let mut executor = WorkflowExecutor::new(workflow, provider, Arc::new(ActionRegistry::with_builtins()))
        .quiet(quiet);
    if let Some(url) = server_url {
        executor = executor.with_server_url(url);
    }
    for (name, value) in assignments {
        executor.set_variable(name, value);
    }

    let summary = executor.run().await?;
    if summary.status == RunStatus::Cancelled && !quiet {
        let ran = summary.jobs.len();
        println!("  {} job(s) ran before cancellation", ran);
    }
    Ok(())
}

async fn validate_workflow(file: &Path) -> Result<(), NoxError> {
    let workflow = Workflow::load(file).await?;

    println!("{} Workflow '{}' is valid", "✓".green(), file.display());
    println!("  Name: {}", workflow.name);
    println!("  Jobs: {}", workflow.jobs.len());
    println!("  Steps: {}", workflow.action_count());
    if workflow.needs_server() {
        println!(
            "  Server: {}",
            workflow.server.as_deref().unwrap_or("(from config)")
        );
    }

    Ok(())
}
