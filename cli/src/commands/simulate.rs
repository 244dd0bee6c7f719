// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline simulation
//!
//! Runs one request through an embedded kernel with a stub action handler
//! that echoes every tool call. Useful for demonstrating the pipeline and
//! for checking a configuration's trust and gate policy end to end.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use governor_core::application::assembly::build_embedded_kernel;
use governor_core::application::orchestrator::{
    GoalSpec, KernelOutcomeStatus, KernelRequest, RequestSource,
};
use governor_core::application::roles::{ActionHandler, ActionOutput};
use governor_core::config::GovernorConfigManifest;
use governor_core::domain::memory::MemoryCandidate;
use governor_core::domain::plan::PlanStep;
use governor_core::domain::tool::{ParamKind, ParamSpec, ToolCall, ToolContract};
use governor_core::domain::trust::{ContentSignals, SourceId, SourceType};

#[derive(Args)]
pub struct SimulateArgs {
    /// Intent of the simulated request
    #[arg(long, default_value = "simulated request")]
    intent: String,

    /// Source type of the caller (user, system, agent, external)
    #[arg(long, default_value = "user")]
    source_type: String,

    /// Caller-reported source reliability
    #[arg(long, default_value_t = 0.9)]
    reliability: f64,

    /// Candidate memory content to gate (repeatable)
    #[arg(long = "memory")]
    memories: Vec<String>,
}

struct EchoHandler;

#[async_trait]
impl ActionHandler for EchoHandler {
    async fn handle(&self, call: &ToolCall) -> anyhow::Result<ActionOutput> {
        Ok(ActionOutput {
            result: serde_json::json!({"tool": call.tool_name, "params": call.params}),
            duration_ms: 1,
        })
    }
}

fn parse_source_type(raw: &str) -> Result<SourceType> {
    match raw {
        "user" => Ok(SourceType::User),
        "system" => Ok(SourceType::System),
        "agent" => Ok(SourceType::Agent),
        "external" => Ok(SourceType::External),
        other => anyhow::bail!("unknown source type '{}'", other),
    }
}

pub async fn handle_command(args: SimulateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = GovernorConfigManifest::load_or_default(config_override)?;
    let agent_id = config.spec.agent_id.clone();

    let (orchestrator, handles) = build_embedded_kernel(&config, Arc::new(EchoHandler));
    handles.registry.register(ToolContract {
        name: "echo".to_string(),
        description: "Echo the request".to_string(),
        params: vec![ParamSpec {
            name: "message".to_string(),
            kind: ParamKind::String,
            required: true,
            description: None,
        }],
    });

    let request = KernelRequest {
        request_id: format!("sim-{}", uuid::Uuid::new_v4()),
        agent_id: agent_id.clone(),
        source: RequestSource {
            id: SourceId::new("simulator"),
            source_type: parse_source_type(&args.source_type)?,
            reported_reliability: args.reliability,
            verified: true,
            age_days: 30.0,
            content_signals: ContentSignals::default(),
        },
        intent: args.intent.clone(),
        goals: vec![GoalSpec {
            description: args.intent,
            priority: 1,
            success_criteria: vec![],
        }],
        steps: vec![PlanStep {
            id: "echo-1".to_string(),
            tool_name: "echo".to_string(),
            params: serde_json::json!({"message": "hello from the simulator"}),
            depends_on: vec![],
        }],
        memory_candidates: args
            .memories
            .iter()
            .map(|content| MemoryCandidate {
                content: content.clone(),
                semantic_similarity: 0.0,
                has_external_links: false,
                conflicts_with_core_values: false,
            })
            .collect(),
    };

    let outcome = orchestrator.handle_request(request).await;

    let status = match outcome.status {
        KernelOutcomeStatus::Completed => "COMPLETED".green().bold(),
        KernelOutcomeStatus::Rejected => "REJECTED".yellow().bold(),
        KernelOutcomeStatus::Failed => "FAILED".red().bold(),
    };
    println!("{} request {}", status, outcome.request_id);
    println!("  final state:        {}", outcome.final_state);
    println!("  consecutive errors: {}", outcome.consecutive_errors);
    if let Some(plan) = &outcome.plan {
        println!("  plan:               {} ({} steps)", plan.id, plan.steps.len());
    }
    if let Some(verification) = &outcome.verification {
        println!(
            "  verification:       {:?} (overall_passed: {})",
            verification.status, verification.overall_passed
        );
    }
    for decision in &outcome.memory_decisions {
        println!("  memory gate:        {} ({})", decision.action, decision.reason);
    }
    if let Some(audit) = &outcome.audit {
        println!(
            "  audit:              drift {:.2}, {} anomalies, chain verified: {}",
            audit.drift_score,
            audit.anomalies.len(),
            audit.chain_verified
        );
    }
    if let Some(error) = &outcome.error {
        println!("  error:              {}", error);
    }

    Ok(())
}
