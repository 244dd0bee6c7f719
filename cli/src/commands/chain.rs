// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event hash-chain commands
//!
//! Verifies an exported event log (a JSON array of event records) by
//! recomputing every hash and checking the per-agent linkage. Any
//! discrepancy proves tampering or corruption at or before the reported
//! row.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use governor_core::domain::events::{verify_chain, EventRecord};

#[derive(Subcommand)]
pub enum ChainCommand {
    /// Verify an exported event chain file
    Verify {
        /// Path to a JSON export of event records
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Restrict verification to one agent's lineage
        #[arg(long)]
        agent_id: Option<String>,
    },
}

pub async fn handle_command(command: ChainCommand) -> Result<()> {
    match command {
        ChainCommand::Verify { file, agent_id } => verify(file, agent_id).await,
    }
}

async fn verify(file: PathBuf, agent_filter: Option<String>) -> Result<()> {
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut records: Vec<EventRecord> =
        serde_json::from_str(&raw).context("Export is not a JSON array of event records")?;
    records.sort_by_key(|r| r.sequence_id);

    let mut by_agent: BTreeMap<String, Vec<EventRecord>> = BTreeMap::new();
    for record in records {
        if let Some(filter) = &agent_filter {
            if &record.agent_id != filter {
                continue;
            }
        }
        by_agent.entry(record.agent_id.clone()).or_default().push(record);
    }

    if by_agent.is_empty() {
        anyhow::bail!("No event records matched");
    }

    let mut failures = 0usize;
    for (agent, chain) in &by_agent {
        match verify_chain(chain) {
            Ok(()) => println!(
                "{} agent '{}': {} events, chain intact",
                "OK".green().bold(),
                agent,
                chain.len()
            ),
            Err(error) => {
                failures += 1;
                println!("{} agent '{}': {}", "FAIL".red().bold(), agent, error);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} chains failed verification", failures, by_agent.len());
    }
    Ok(())
}
