//! Configuration commands.
//!
//! `show` prints the merged `mnp-chat.json` configuration, `validate` prints
//! advisory warnings.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use mnp_chat::config::loader::{LoadedChatConfig, load_merged};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the merged configuration
    Show {
        /// Output as raw JSON (no formatting)
        #[arg(long)]
        json: bool,

        /// Path to use as local directory (defaults to current dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Validate configuration and show warnings
    Validate {
        /// Path to use as local directory (defaults to current dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn execute(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show { json, path } => cmd_show(json, path),
        ConfigCommands::Validate { path } => cmd_validate(path),
    }
}

fn load(path: Option<PathBuf>) -> Result<LoadedChatConfig> {
    let dir = match path {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    load_merged(&dir).with_context(|| format!("Failed to load config from {}", dir.display()))
}

fn cmd_show(json_output: bool, path: Option<PathBuf>) -> Result<()> {
    let loaded = load(path)?;

    for warning in &loaded.warnings {
        eprintln!("{} {}", "WARN".yellow(), warning);
    }

    if json_output {
        println!("{}", serde_json::to_string(&loaded.config)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&loaded.config)?);
    }
    if loaded.config.api_key.is_some() {
        eprintln!("{} API key set (hidden)", "INFO".blue());
    }

    Ok(())
}

fn cmd_validate(path: Option<PathBuf>) -> Result<()> {
    let loaded = load(path)?;

    if loaded.warnings.is_empty() {
        println!("{} Configuration is valid", "OK".green());
    } else {
        println!(
            "{} Configuration has {} warning(s):",
            "WARN".yellow(),
            loaded.warnings.len()
        );
        for w in &loaded.warnings {
            println!("  - {w}");
        }
    }

    println!("\nConfig files:");
    match &loaded.paths.global {
        Some(global) => println!("  Global: {}", global.display()),
        None => println!("  Global: (no config directory)"),
    }
    println!("  Local:  {}", loaded.paths.local.display());

    Ok(())
}
