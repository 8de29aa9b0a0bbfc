//! Sessions command - inspect and invalidate stored sessions.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the sessions command.
#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: Option<SessionsCommand>,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List all session ids (default)
    List,

    /// Count stored sessions
    Count,

    /// Show a session's metadata and attributes
    ///
    /// Reading attributes refreshes the session's expiry, like any access.
    Show {
        /// Session ID
        id: String,
    },

    /// Delete a session from the store
    Invalidate {
        /// Session ID
        id: String,
    },
}

/// Session details for JSON output.
#[derive(Debug, Serialize)]
struct SessionOutput {
    id: String,
    creation_time: DateTime<Utc>,
    last_accessed_time: DateTime<Utc>,
    max_inactive_interval_secs: u64,
    attributes: BTreeMap<String, String>,
}

/// Run the sessions command.
pub async fn run(args: SessionsArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(SessionsCommand::List) {
        SessionsCommand::List => cmd_list(ctx).await,
        SessionsCommand::Count => cmd_count(ctx).await,
        SessionsCommand::Show { id } => cmd_show(ctx, &id).await,
        SessionsCommand::Invalidate { id } => cmd_invalidate(ctx, &id).await,
    }
}

async fn cmd_list(ctx: &Context) -> Result<()> {
    let registry = ctx.registry().await?;
    let mut ids: Vec<String> = registry.all_sessions().await?.into_iter().collect();
    ids.sort();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!("No sessions");
        return Ok(());
    }

    for id in &ids {
        println!("{id}");
    }
    if ctx.verbose {
        let dim = Style::new().dim();
        println!();
        println!("{}", dim.apply_to(format!("{} session(s)", ids.len())));
    }
    Ok(())
}

async fn cmd_count(ctx: &Context) -> Result<()> {
    let registry = ctx.registry().await?;
    let count = registry.all_sessions().await?.len();

    if ctx.json_output {
        println!("{}", serde_json::json!({ "count": count }));
    } else {
        println!("{count}");
    }
    Ok(())
}

async fn cmd_show(ctx: &Context, id: &str) -> Result<()> {
    let registry = ctx.registry().await?;
    let Some(session) = registry.get_session_by_id(Some(id)).await? else {
        bail!("session not found: {id}");
    };

    let mut attributes = BTreeMap::new();
    for name in session.get_attribute_names().await? {
        if let Some(value) = session.get_attribute(&name).await? {
            attributes.insert(name, value);
        }
    }

    let output = SessionOutput {
        id: session.id(),
        creation_time: session.creation_time(),
        last_accessed_time: session.last_accessed_time().await?,
        max_inactive_interval_secs: session.max_inactive_interval(),
        attributes,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style(format!("Session {}", output.id)).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  {} {}",
        dim.apply_to("Created:      "),
        output.creation_time.to_rfc3339()
    );
    println!(
        "  {} {}",
        dim.apply_to("Last accessed:"),
        output.last_accessed_time.to_rfc3339()
    );
    println!(
        "  {} {}s",
        dim.apply_to("Max inactive: "),
        output.max_inactive_interval_secs
    );
    println!();
    if output.attributes.is_empty() {
        println!("  {}", dim.apply_to("(no attributes)"));
    } else {
        for (name, value) in &output.attributes {
            println!("  {} = {}", style(name).cyan(), value);
        }
    }
    println!();
    Ok(())
}

async fn cmd_invalidate(ctx: &Context, id: &str) -> Result<()> {
    let registry = ctx.registry().await?;
    match registry.get_session_by_id(Some(id)).await? {
        Some(session) => session.invalidate(None).await?,
        // A session without attributes has only its metadata key.
        None => {
            if !registry.remove_session(id).await? {
                bail!("session not found: {id}");
            }
        }
    }
    tracing::info!(session_id = %id, "Session invalidated from CLI");

    if ctx.json_output {
        println!("{}", serde_json::json!({ "invalidated": id }));
    } else {
        let green = Style::new().green();
        println!("{} {}", green.apply_to("✓ invalidated"), id);
    }
    Ok(())
}
