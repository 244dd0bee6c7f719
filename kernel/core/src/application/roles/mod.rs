// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Role Adapters
//!
//! Each pipeline stage hides behind a narrow contract so an in-process
//! adapter can be swapped for a remote/transport-backed implementation
//! without touching the orchestrator. Every role invocation is timed and
//! recorded (success/failure counter plus latency histogram, keyed by role
//! name): misbehavior in any one role must be individually observable.

pub mod planner;
pub mod executor;
pub mod verifier;
pub mod memory_writer;
pub mod auditor;

pub use auditor::InProcessAuditor;
pub use executor::{ActionHandler, ActionOutput, InProcessExecutor};
pub use memory_writer::InProcessMemoryWriter;
pub use planner::InProcessPlanner;
pub use verifier::InProcessVerifier;

use async_trait::async_trait;
use metrics::{counter, histogram};
use std::future::Future;
use std::time::Instant;

use crate::application::audit::AuditReport;
use crate::application::verification::StepResult;
use crate::domain::memory::MemoryGateDecision;
use crate::domain::plan::{ExecutionPlan, PlanId};
use crate::domain::verification::VerificationReport;
use crate::application::orchestrator::KernelRequest;

/// Failure surfaced at a role boundary. Caught by the orchestrator, recorded
/// in telemetry, and counted toward the safe-mode threshold; never an
/// unhandled fault.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Memory write failed: {0}")]
    MemoryWrite(String),

    #[error("Audit failed: {0}")]
    Audit(String),
}

#[async_trait]
pub trait PlannerRole: Send + Sync {
    async fn create_plan(&self, request: &KernelRequest) -> Result<ExecutionPlan, RoleError>;

    async fn validate_plan(&self, plan: &ExecutionPlan) -> Result<(), RoleError>;

    async fn get_active_plan(&self) -> Option<ExecutionPlan>;

    async fn cancel_plan(&self, plan_id: PlanId) -> bool;
}

#[async_trait]
pub trait ExecutorRole: Send + Sync {
    /// Execute a plan's steps in dependency order. Individual step failures
    /// come back as structured results; only unexpected conditions error.
    async fn execute(&self, plan: &ExecutionPlan) -> Result<Vec<StepResult>, RoleError>;
}

#[async_trait]
pub trait VerifierRole: Send + Sync {
    async fn verify(
        &self,
        plan: &ExecutionPlan,
        results: &[StepResult],
    ) -> Result<VerificationReport, RoleError>;
}

#[async_trait]
pub trait MemoryWriterRole: Send + Sync {
    /// Gate every candidate memory write in the request; persist the
    /// allowed ones. Returns one decision per candidate, in order.
    async fn write(&self, request: &KernelRequest)
        -> Result<Vec<MemoryGateDecision>, RoleError>;
}

#[async_trait]
pub trait AuditorRole: Send + Sync {
    async fn audit(&self, request: &KernelRequest) -> Result<AuditReport, RoleError>;
}

/// Time a role invocation and record its outcome, keyed by role name.
pub async fn observe_role<T, F>(role: &'static str, operation: F) -> Result<T, RoleError>
where
    F: Future<Output = Result<T, RoleError>>,
{
    let started = Instant::now();
    let result = operation.await;
    let outcome = if result.is_ok() { "success" } else { "failure" };
    counter!(crate::telemetry::ROLE_EXECUTIONS_TOTAL, "role" => role, "outcome" => outcome)
        .increment(1);
    histogram!(crate::telemetry::ROLE_DURATION_SECONDS, "role" => role)
        .record(started.elapsed().as_secs_f64());
    result
}
