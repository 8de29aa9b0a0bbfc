//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration (default)
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    // Fill every section so the output shows values actually in effect.
    let mut effective = ctx.config.clone();
    let mut redis = effective.redis();
    redis.url = ctx.redis_url.clone();
    effective.redis = Some(redis);
    effective.session = Some(effective.session());

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    println!("# Ember Configuration\n");
    if ctx.config_sources.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        for path in &ctx.config_sources {
            println!("# Loaded from {}", path.display());
        }
        println!();
    }
    print!("{}", effective.to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let paths: Vec<String> = ctx
            .config_sources
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    if ctx.config_sources.is_empty() {
        println!("No config files loaded (using defaults)");
    }
    for (i, path) in ctx.config_sources.iter().enumerate() {
        println!("{}. {}", i + 1, path.display());
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    match ember_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("Could not determine config directory"),
    }
    Ok(())
}
