//! Ember - session store administration
//!
//! Main entry point for the Ember CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, sessions};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Ember - inspect and manage sessions held in a shared cache
#[derive(Parser)]
#[command(name = "ember")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Redis URL (overrides the config file)
    #[arg(long, global = true, env = "EMBER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Load this config file instead of discovering one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and invalidate stored sessions
    Sessions(sessions::SessionsArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "ember=debug,ember_session=debug,ember_redis=debug,ember_config=debug,info"
    } else {
        "ember=info,ember_session=info,ember_redis=info,warn"
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let loaded = match cli.config {
        Some(ref path) => ember_config::LoadedConfig {
            config: ember_config::load_config_file(path)?,
            loaded_from: vec![path.clone()],
        },
        None => ember_config::load_config(None)?,
    };
    loaded.config.validate()?;

    let ctx = commands::Context {
        redis_url: cli
            .redis_url
            .unwrap_or_else(|| loaded.config.redis().url),
        config: loaded.config,
        config_sources: loaded.loaded_from,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Sessions(args) => sessions::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
