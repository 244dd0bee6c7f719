// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use governor_core::config::GovernorConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./governor-config.yaml")]
        output: PathBuf,

        /// Agent the kernel instance governs
        #[arg(long, default_value = "default-agent")]
        agent_id: String,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, agent_id } => generate(output, agent_id).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  {} {}", "override:".cyan(), path.display());
        }
        for path in GovernorConfigManifest::discovery_paths() {
            let marker = if path.exists() { "✓".green() } else { "✗".red() };
            println!("  {} {}", marker, path.display());
        }
        println!();
    }

    let config = GovernorConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    println!("{}", config.to_yaml()?);
    Ok(())
}

async fn validate(file: Option<PathBuf>) -> Result<()> {
    let config = GovernorConfigManifest::load_or_default(file)
        .context("Configuration failed to load")?;
    config.validate().context("Configuration is invalid")?;

    println!(
        "{} configuration '{}' is valid (agent: {})",
        "OK".green().bold(),
        config.metadata.name,
        config.spec.agent_id
    );
    Ok(())
}

async fn generate(output: PathBuf, agent_id: String) -> Result<()> {
    let manifest = GovernorConfigManifest::default_for_agent(agent_id);
    std::fs::write(&output, manifest.to_yaml()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} wrote sample configuration to {}",
        "OK".green().bold(),
        output.display()
    );
    Ok(())
}
