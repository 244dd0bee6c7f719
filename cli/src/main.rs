// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Governor CLI
//!
//! Operator surface for the autonomy governance kernel:
//!
//! - `aegis-gov config show|validate|generate` - configuration management
//! - `aegis-gov chain verify` - recompute and verify an exported event chain
//! - `aegis-gov simulate` - run one request through an embedded kernel

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ChainCommand, ConfigCommand, SimulateArgs};

/// AEGIS Governor - govern autonomous agent action
#[derive(Parser)]
#[command(name = "aegis-gov")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AEGIS_GOVERNOR_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_GOVERNOR_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Expose Prometheus metrics on this localhost port
    #[arg(long, global = true, env = "AEGIS_GOVERNOR_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Event hash-chain operations
    Chain {
        #[command(subcommand)]
        command: ChainCommand,
    },

    /// Run one request through an embedded kernel
    Simulate(SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    if let Some(port) = cli.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([127, 0, 0, 1], port))
            .install()?;
    }

    match cli.command {
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Chain { command } => commands::chain::handle_command(command).await,
        Commands::Simulate(args) => commands::simulate::handle_command(args, cli.config).await,
    }
}
