//! convergectl - converge GitLab registry tokens and runner registrations

use anyhow::Context;
use clap::{Parser, Subcommand};
use converge_core::SystemClock;
use convergectl::output::{self, OutputFormat};
use convergectl::{failures, Host, Manifest};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// convergectl CLI
#[derive(Parser)]
#[command(name = "convergectl")]
#[command(about = "Converge GitLab registry tokens and CI runner registrations", long_about = None)]
#[command(version)]
struct Cli {
    /// Manifest file path
    #[arg(short, long, env = "CONVERGE_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "CONVERGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "CONVERGE_LOG_JSON")]
    json: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one convergence pass over every declared resource
    Apply,

    /// Show what apply would do without changing anything
    Plan,

    /// List registry tokens present on disk
    Inventory,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, reports to stdout
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let manifest = Manifest::load(cli.manifest.as_deref()).context("Failed to load manifest")?;
    let host = Host::new(&manifest.settings, Arc::new(SystemClock))
        .context("Failed to initialize host")?;

    match cli.command {
        Commands::Apply => {
            let outcomes = host.apply(&manifest);
            println!("{}", output::render_outcomes(&outcomes, cli.output)?);

            let failed = failures(&outcomes);
            if failed > 0 {
                output::print_error(&format!("{} resource(s) failed", failed));
                std::process::exit(1);
            }
            if cli.output == OutputFormat::Table {
                output::print_success(&format!("{} resource(s) processed", outcomes.len()));
            }
        }
        Commands::Plan => {
            let outcomes = host.plan(&manifest);
            println!("{}", output::render_outcomes(&outcomes, cli.output)?);

            if failures(&outcomes) > 0 && cli.output == OutputFormat::Table {
                output::print_warning("Some resources failed validation or probing");
            }
        }
        Commands::Inventory => {
            let entries = host.inventory().context("Failed to list registry tokens")?;
            println!("{}", output::render_inventory(&entries, cli.output)?);
        }
    }

    Ok(())
}
