//! gymharness: evaluate LLM agents on remote text environments
//!
//! Provides subcommands:
//!
//! - `serve`  -- Run the HTTP evaluation service (`POST /evaluator`)
//! - `eval`   -- Evaluate once from the command line and print the report
//! - `envs`   -- List the registered environments

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gymharness::agent::{ApiAgent, ScriptedAgent};
use gymharness::env::EnvRegistry;
use gymharness::eval::{default_ids, run_batch, BatchSpec, EvaluationReport};
use gymharness::server::{self, AppState};
use gymharness::HarnessConfig;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// gymharness: evaluate LLM agents on remote text environments
#[derive(Parser)]
#[command(name = "gymharness", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment to evaluate; overrides ENV_NAME and the config file.
    #[arg(long, global = true)]
    env: Option<String>,

    /// Base URL of the environment server.
    #[arg(long, global = true)]
    env_server_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP evaluation service.
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Evaluate a list of data indices and print the report as JSON.
    Eval {
        /// Comma-separated indices (default: 0..min(data_len, max_default_ids)).
        #[arg(long, value_delimiter = ',')]
        ids: Vec<usize>,

        #[arg(long)]
        max_round: Option<usize>,

        /// Concurrent conversation slots.
        #[arg(long)]
        n_clients: Option<usize>,

        /// Model identifier for the chat-completions API.
        #[arg(long)]
        model: Option<String>,

        /// Write the report to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Answer every turn with a fixed action instead of calling a model.
        #[arg(long)]
        offline: bool,
    },

    /// List the registered environments.
    Envs,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    config.apply_env();
    if let Some(env) = &cli.env {
        config.env_name = env.to_lowercase();
    }
    if let Some(base) = &cli.env_server_base {
        config.env_server_base = base.clone();
    }

    let registry = Arc::new(EnvRegistry::builtin());

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.validate().context("Invalid configuration")?;
            cmd_serve(config, registry).await
        }
        Commands::Eval {
            ids,
            max_round,
            n_clients,
            model,
            output,
            offline,
        } => {
            if let Some(max_round) = max_round {
                config.max_round = max_round;
            }
            if let Some(n_clients) = n_clients {
                config.n_clients = n_clients;
            }
            if let Some(model) = model {
                config.agent.model = model;
            }
            config.validate().context("Invalid configuration")?;
            cmd_eval(&config, &registry, ids, offline, output.as_deref()).await
        }
        Commands::Envs => {
            cmd_envs(&registry);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config: HarnessConfig, registry: Arc<EnvRegistry>) -> Result<()> {
    if !registry.contains(config.task_name()) {
        anyhow::bail!(
            "Unknown environment '{}' (known: {})",
            config.task_name(),
            registry.names().join(", ")
        );
    }
    if config.agent.api_key.is_empty() {
        tracing::warn!("CHUTES_API_KEY is not set; /evaluator will answer 401");
    }

    server::run(AppState::new(Arc::new(config), registry))
        .await
        .context("Evaluation service failed")
}

async fn cmd_eval(
    config: &HarnessConfig,
    registry: &EnvRegistry,
    ids: Vec<usize>,
    offline: bool,
    output: Option<&Path>,
) -> Result<()> {
    let spec = BatchSpec {
        env: config.task_name().to_string(),
        report_name: config.env_name.clone(),
        settings: config.env_settings(),
        n_clients: config.n_clients,
        max_round: config.max_round,
        ids: if ids.is_empty() {
            default_ids(config.data_len, config.max_default_ids)
        } else {
            ids
        },
    };

    let report = if offline {
        tracing::info!("Using scripted offline agent");
        run_batch(registry, &spec, ScriptedAgent::default()).await?
    } else {
        let agent = ApiAgent::new(&config.agent).context("Failed to build model client")?;
        if !agent.validate_key().await.context("Failed to validate API key")? {
            anyhow::bail!("Invalid API key for {}", config.agent.base_url);
        }
        run_batch(registry, &spec, agent).await?
    };

    write_report(&report, output)
}

fn write_report(report: &EvaluationReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                score = report.total_score,
                success_rate = format!("{:.2}%", report.success_rate * 100.0),
                "Saved report"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_envs(registry: &EnvRegistry) {
    println!("Registered environments:");
    for name in registry.names() {
        println!("  {name}");
    }
}
