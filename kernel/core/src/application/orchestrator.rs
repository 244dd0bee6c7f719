// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kernel Orchestrator
//!
//! Top-level coordinator: drives the state machine, invokes the five roles
//! in sequence, aggregates consecutive-error counts, and trips safe mode.
//!
//! # Pipeline
//!
//! ```text
//! idle -> planning -> executing -> verifying -> writing_memory -> auditing -> idle
//! ```
//!
//! A single orchestrator instance processes one request's pipeline at a time;
//! concurrent callers are accepted and serialized through the pipeline lock.
//! Any stage failure increments `consecutive_errors`; crossing the configured
//! threshold forces safe mode, which blocks further autonomous requests
//! until a trusted exit is approved.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::audit::AuditReport;
use crate::application::roles::{
    observe_role, AuditorRole, ExecutorRole, MemoryWriterRole, PlannerRole, RoleError,
    VerifierRole,
};
use crate::application::safe_mode::SafeModeController;
use crate::application::trust::SourceTracker;
use crate::application::verification::StepResult;
use crate::domain::events::{NewEvent, PipelineEvent};
use crate::domain::goal::AGENT_GOAL_TRUST_FLOOR;
use crate::domain::memory::{GateAction, MemoryCandidate, MemoryGateDecision};

use crate::domain::plan::{ExecutionPlan, PlanStep};
use crate::domain::repository::EventStore;
use crate::domain::state::{KernelState, KernelStateMachine, StateTrigger};
use crate::domain::trust::{ContentSignals, SourceId, SourceType, TrustSource};
use crate::domain::verification::{VerificationReport, VerificationStatus};
use crate::infrastructure::event_bus::EventBus;

/// A goal the request wants created, before the trust gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSpec {
    pub description: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

/// The requesting source as presented to the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSource {
    pub id: SourceId,
    pub source_type: SourceType,
    /// Caller-reported reliability; overridden by tracked history.
    pub reported_reliability: f64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub age_days: f64,
    #[serde(default)]
    pub content_signals: ContentSignals,
}

impl RequestSource {
    pub fn as_trust_source(&self) -> TrustSource {
        TrustSource {
            id: self.id.clone(),
            source_type: self.source_type,
            reliability: self.reported_reliability,
        }
    }
}

/// One request through the governance pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelRequest {
    pub request_id: String,
    pub agent_id: String,
    pub source: RequestSource,
    pub intent: String,
    #[serde(default)]
    pub goals: Vec<GoalSpec>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub memory_candidates: Vec<MemoryCandidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelOutcomeStatus {
    Completed,
    /// Refused before the pipeline started (trust floor, safe mode).
    Rejected,
    Failed,
}

/// Typed result every caller receives. Never a raw unhandled fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelOutcome {
    pub request_id: String,
    pub status: KernelOutcomeStatus,
    pub final_state: KernelState,
    pub consecutive_errors: u32,
    pub plan: Option<ExecutionPlan>,
    pub step_results: Vec<StepResult>,
    pub verification: Option<VerificationReport>,
    pub memory_decisions: Vec<MemoryGateDecision>,
    pub audit: Option<AuditReport>,
    pub error: Option<String>,
}

pub struct KernelOrchestrator {
    machine: Arc<KernelStateMachine>,
    safe_mode: Arc<SafeModeController>,
    tracker: Arc<SourceTracker>,
    planner: Arc<dyn PlannerRole>,
    executor: Arc<dyn ExecutorRole>,
    verifier: Arc<dyn VerifierRole>,
    memory_writer: Arc<dyn MemoryWriterRole>,
    auditor: Arc<dyn AuditorRole>,
    events: Arc<dyn EventStore>,
    bus: EventBus,
    // One pipeline at a time per kernel instance; concurrent requests queue
    // here rather than interleaving FSM triggers.
    pipeline: tokio::sync::Mutex<()>,
}

impl KernelOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        machine: Arc<KernelStateMachine>,
        safe_mode: Arc<SafeModeController>,
        tracker: Arc<SourceTracker>,
        planner: Arc<dyn PlannerRole>,
        executor: Arc<dyn ExecutorRole>,
        verifier: Arc<dyn VerifierRole>,
        memory_writer: Arc<dyn MemoryWriterRole>,
        auditor: Arc<dyn AuditorRole>,
        events: Arc<dyn EventStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            machine,
            safe_mode,
            tracker,
            planner,
            executor,
            verifier,
            memory_writer,
            auditor,
            events,
            bus,
            pipeline: tokio::sync::Mutex::new(()),
        }
    }

    pub fn current_state(&self) -> KernelState {
        self.machine.current_state()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.machine.consecutive_errors()
    }

    /// Run one request through the full pipeline.
    pub async fn handle_request(&self, request: KernelRequest) -> KernelOutcome {
        let _pipeline = self.pipeline.lock().await;

        if self.safe_mode.is_active() {
            return self.rejected(&request, "kernel is in safe mode; autonomous action is halted");
        }

        // Trust-floor pre-flight: an under-trusted agent request that wants
        // goals never reaches the planning stage.
        let effective_trust = self
            .tracker
            .effective_reliability(&request.source.as_trust_source());
        if matches!(
            request.source.source_type,
            SourceType::Agent | SourceType::External
        ) && !request.goals.is_empty()
            && effective_trust < AGENT_GOAL_TRUST_FLOOR
        {
            return self.rejected(
                &request,
                &format!(
                    "source trust {:.2} is below the agent goal floor {:.2}",
                    effective_trust, AGENT_GOAL_TRUST_FLOOR
                ),
            );
        }

        info!(
            request_id = %request.request_id,
            agent_id = %request.agent_id,
            source = %request.source.id,
            "Handling kernel request"
        );

        let mut outcome = KernelOutcome {
            request_id: request.request_id.clone(),
            status: KernelOutcomeStatus::Completed,
            final_state: self.machine.current_state(),
            consecutive_errors: self.machine.consecutive_errors(),
            plan: None,
            step_results: Vec::new(),
            verification: None,
            memory_decisions: Vec::new(),
            audit: None,
            error: None,
        };

        // ── Planning ─────────────────────────────────────────────────────
        self.advance(&request, StateTrigger::PlanRequested);
        let plan = match observe_role("planner", async {
            let plan = self.planner.create_plan(&request).await?;
            self.planner.validate_plan(&plan).await?;
            Ok(plan)
        })
        .await
        {
            Ok(plan) => plan,
            Err(error) => return self.stage_failed(&request, outcome, error).await,
        };
        self.record(&request, "plan_created", serde_json::json!({
            "plan_id": plan.id.to_string(),
            "steps": plan.steps.len(),
            "goals": plan.goals.len(),
        }))
        .await;
        outcome.plan = Some(plan.clone());

        // ── Executing ────────────────────────────────────────────────────
        self.advance(&request, StateTrigger::PlanReady);
        let step_results = match observe_role("executor", self.executor.execute(&plan)).await {
            Ok(results) => results,
            Err(error) => return self.stage_failed(&request, outcome, error).await,
        };
        for result in &step_results {
            self.record(&request, "step_executed", serde_json::json!({
                "step_id": result.step_id,
                "tool": result.tool_name,
                "success": result.success,
                "duration_ms": result.duration_ms,
            }))
            .await;
        }
        let any_step_failed = step_results.iter().any(|r| !r.success);
        outcome.step_results = step_results.clone();
        if any_step_failed {
            let failed = step_results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.step_id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return self
                .stage_failed(
                    &request,
                    outcome,
                    RoleError::Execution(format!("steps failed: {}", failed)),
                )
                .await;
        }

        // ── Verifying ────────────────────────────────────────────────────
        self.advance(&request, StateTrigger::ExecutionComplete);
        let verification =
            match observe_role("verifier", self.verifier.verify(&plan, &step_results)).await {
                Ok(report) => report,
                Err(error) => return self.stage_failed(&request, outcome, error).await,
            };
        self.record(&request, "verification_completed", serde_json::json!({
            "status": verification.status,
            "overall_passed": verification.overall_passed,
            "schema_issues": verification.schema_issues.len(),
        }))
        .await;
        let verification_failed = verification.status == VerificationStatus::Failed;
        if verification.status == VerificationStatus::Partial {
            warn!(request_id = %request.request_id, "Verification passed partially");
        }
        outcome.verification = Some(verification);
        if verification_failed {
            return self
                .stage_failed(
                    &request,
                    outcome,
                    RoleError::Verification("critical verification failure".to_string()),
                )
                .await;
        }

        // ── Writing memory ───────────────────────────────────────────────
        self.advance(&request, StateTrigger::VerificationPassed);
        let decisions =
            match observe_role("memory_writer", self.memory_writer.write(&request)).await {
                Ok(decisions) => decisions,
                Err(error) => return self.stage_failed(&request, outcome, error).await,
            };
        for (candidate, decision) in request.memory_candidates.iter().zip(decisions.iter()) {
            self.publish_gate_decision(&request, decision);
            self.record(&request, "memory_gated", serde_json::json!({
                "action": decision.action,
                "trust_score": decision.trust_score,
                "content_len": candidate.content.len(),
            }))
            .await;
        }
        outcome.memory_decisions = decisions;

        // ── Auditing ─────────────────────────────────────────────────────
        self.advance(&request, StateTrigger::WriteMemory);
        let audit = match observe_role("auditor", self.auditor.audit(&request)).await {
            Ok(report) => report,
            Err(error) => return self.stage_failed(&request, outcome, error).await,
        };
        self.record(&request, "audit_completed", serde_json::json!({
            "drift_score": audit.drift_score,
            "anomalies": audit.anomalies.len(),
            "chain_verified": audit.chain_verified,
        }))
        .await;
        outcome.audit = Some(audit);

        self.advance(&request, StateTrigger::AuditComplete);

        outcome.status = KernelOutcomeStatus::Completed;
        outcome.final_state = self.machine.current_state();
        outcome.consecutive_errors = self.machine.consecutive_errors();
        info!(request_id = %request.request_id, "Request completed");
        outcome
    }

    fn advance(&self, request: &KernelRequest, trigger: StateTrigger) {
        let result = self.machine.transition(trigger);
        if result.accepted {
            self.bus.publish(PipelineEvent::StageEntered {
                request_id: request.request_id.clone(),
                from: result.from,
                to: result.to,
                trigger,
                at: Utc::now(),
            });
        } else {
            warn!(
                request_id = %request.request_id,
                state = %result.from,
                trigger = %trigger,
                "Transition rejected"
            );
        }
    }

    async fn stage_failed(
        &self,
        request: &KernelRequest,
        mut outcome: KernelOutcome,
        error: RoleError,
    ) -> KernelOutcome {
        let stage = self.machine.current_state();
        self.machine.transition(StateTrigger::FatalError);
        let consecutive_errors = self.machine.consecutive_errors();

        warn!(
            request_id = %request.request_id,
            stage = %stage,
            consecutive_errors,
            error = %error,
            "Pipeline stage failed"
        );
        self.bus.publish(PipelineEvent::StageFailed {
            request_id: request.request_id.clone(),
            stage,
            reason: error.to_string(),
            consecutive_errors,
            at: Utc::now(),
        });
        self.record(request, "stage_failed", serde_json::json!({
            "stage": stage,
            "error": error.to_string(),
            "consecutive_errors": consecutive_errors,
        }))
        .await;

        if self.safe_mode.should_trigger(consecutive_errors) {
            self.safe_mode.enter(format!(
                "{} consecutive pipeline failures (threshold {})",
                consecutive_errors,
                self.safe_mode.threshold()
            ));
        } else {
            // Leave the error sink so the next request can run.
            self.machine.transition(StateTrigger::ErrorRecovered);
        }

        outcome.status = KernelOutcomeStatus::Failed;
        outcome.final_state = self.machine.current_state();
        outcome.consecutive_errors = consecutive_errors;
        outcome.error = Some(error.to_string());
        outcome
    }

    fn rejected(&self, request: &KernelRequest, reason: &str) -> KernelOutcome {
        warn!(request_id = %request.request_id, reason, "Request rejected");
        KernelOutcome {
            request_id: request.request_id.clone(),
            status: KernelOutcomeStatus::Rejected,
            final_state: self.machine.current_state(),
            consecutive_errors: self.machine.consecutive_errors(),
            plan: None,
            step_results: Vec::new(),
            verification: None,
            memory_decisions: Vec::new(),
            audit: None,
            error: Some(reason.to_string()),
        }
    }

    fn publish_gate_decision(&self, request: &KernelRequest, decision: &MemoryGateDecision) {
        self.bus.publish(PipelineEvent::MemoryGated {
            request_id: request.request_id.clone(),
            action: decision.action,
            reason: decision.reason.clone(),
            at: Utc::now(),
        });
        if decision.action == GateAction::Quarantine {
            warn!(request_id = %request.request_id, "Memory candidate quarantined");
        }
    }

    async fn record(&self, request: &KernelRequest, event_type: &str, payload: serde_json::Value) {
        let event = NewEvent::new(
            request.agent_id.clone(),
            request.request_id.clone(),
            event_type,
            payload,
        );
        if let Err(error) = self.events.append(event).await {
            // The audit trail is load-bearing, but a persistence hiccup must
            // not crash the pipeline mid-stage.
            warn!(request_id = %request.request_id, error = %error, "Failed to append event");
        }
    }
}
