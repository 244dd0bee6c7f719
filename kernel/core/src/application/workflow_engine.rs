// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Engine Application Service
//!
//! Executes named, registered multi-step workflows with timeout and
//! dead-letter semantics. The local variant here runs steps sequentially
//! in-process; `durable_engine` layers the same contract over an external
//! durable-execution backend.
//!
//! # Dead Letters
//!
//! Every timeout, execution error, or start error produces a dead letter
//! preserving the original input for replay. The buffer is a bounded ring:
//! past the configured maximum the oldest entries are evicted.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::workflow::{
    DeadLetterReason, ExecutionState, WorkflowDeadLetter, WorkflowDefinition, WorkflowError,
    WorkflowExecutionId, WorkflowInput, WorkflowResult, WorkflowStatus,
};

/// Engine default execution timeout: 30 seconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default dead-letter ring capacity.
pub const DEFAULT_MAX_DEAD_LETTERS: usize = 1_000;

/// Uniform engine contract shared by the local and durable variants.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn register(&self, definition: WorkflowDefinition) -> Result<(), WorkflowError>;

    /// Execute a registered workflow to a terminal [`WorkflowResult`].
    /// Never panics or surfaces a raw fault: failures come back typed.
    async fn execute(&self, workflow_id: &str, input: WorkflowInput) -> WorkflowResult;

    async fn get_status(&self, execution_id: WorkflowExecutionId) -> Option<ExecutionState>;

    /// Best-effort cancellation. The local variant has no native
    /// cancellation and always returns false.
    async fn cancel(&self, execution_id: WorkflowExecutionId) -> bool;

    async fn dead_letters(&self) -> Vec<WorkflowDeadLetter>;

    async fn list_workflows(&self) -> Vec<String>;

    async fn close(&self);
}

/// Bounded ring buffer of dead letters, shared by both engine variants.
pub(crate) struct DeadLetterBuffer {
    entries: Mutex<VecDeque<WorkflowDeadLetter>>,
    max: usize,
}

impl DeadLetterBuffer {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max: max.max(1),
        }
    }

    pub(crate) fn push(&self, letter: WorkflowDeadLetter) {
        warn!(
            workflow_id = %letter.workflow_id,
            execution_id = %letter.execution_id,
            reason = %letter.reason,
            "Workflow dead-lettered"
        );
        let mut entries = self.entries.lock();
        entries.push_back(letter);
        while entries.len() > self.max {
            entries.pop_front();
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<WorkflowDeadLetter> {
        self.entries.lock().iter().cloned().collect()
    }
}

/// In-process reference engine.
pub struct LocalWorkflowEngine {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    executions: RwLock<HashMap<WorkflowExecutionId, ExecutionState>>,
    dead_letters: Arc<DeadLetterBuffer>,
    default_timeout_ms: u64,
    closed: Mutex<bool>,
}

impl LocalWorkflowEngine {
    pub fn new(default_timeout_ms: u64, max_dead_letters: usize) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            dead_letters: Arc::new(DeadLetterBuffer::new(max_dead_letters)),
            default_timeout_ms,
            closed: Mutex::new(false),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, DEFAULT_MAX_DEAD_LETTERS)
    }

    async fn run_steps(
        definition: &WorkflowDefinition,
        input: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let mut current = input;
        for step in &definition.steps {
            current = step
                .execute(current)
                .await
                .map_err(|e| e.context(format!("step '{}' failed", step.name())))?;
        }
        Ok(current)
    }

    fn failure(
        execution_id: WorkflowExecutionId,
        workflow_id: &str,
        status: WorkflowStatus,
        error: String,
        dead_lettered: bool,
        duration_ms: u64,
    ) -> WorkflowResult {
        WorkflowResult {
            execution_id,
            workflow_id: workflow_id.to_string(),
            success: false,
            status,
            output: None,
            error: Some(error),
            dead_lettered,
            duration_ms,
        }
    }
}

#[async_trait]
impl WorkflowEngine for LocalWorkflowEngine {
    async fn register(&self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        if *self.closed.lock() {
            return Err(WorkflowError::Closed);
        }
        if definition.steps.is_empty() {
            return Err(WorkflowError::NoSteps(definition.id.clone()));
        }
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.id) {
            return Err(WorkflowError::AlreadyRegistered(definition.id.clone()));
        }
        info!(workflow_id = %definition.id, steps = definition.steps.len(), "Registering workflow");
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn execute(&self, workflow_id: &str, input: WorkflowInput) -> WorkflowResult {
        let execution_id = WorkflowExecutionId::new();
        let started = Instant::now();

        if *self.closed.lock() {
            return Self::failure(
                execution_id,
                workflow_id,
                WorkflowStatus::Failed,
                "engine is closed".to_string(),
                false,
                0,
            );
        }

        let Some(definition) = self.definitions.read().await.get(workflow_id).cloned() else {
            // No execution ever started, so nothing to dead-letter.
            return Self::failure(
                execution_id,
                workflow_id,
                WorkflowStatus::Failed,
                format!("workflow '{}' is not registered", workflow_id),
                false,
                0,
            );
        };

        let timeout_ms = input.timeout_ms.unwrap_or(self.default_timeout_ms);
        self.executions
            .write()
            .await
            .insert(execution_id, ExecutionState::Running);

        info!(
            workflow_id = %workflow_id,
            execution_id = %execution_id,
            timeout_ms,
            "Starting workflow execution"
        );

        // Race the work against the timer; tokio::time::timeout drops the
        // timer on either outcome. On timeout the in-flight future is
        // dropped, not forcibly killed mid-poll, and its result discarded.
        let payload = input.payload();
        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            Self::run_steps(&definition, payload),
        )
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        let (state, result) = match outcome {
            Ok(Ok(output)) => (
                ExecutionState::Completed,
                WorkflowResult {
                    execution_id,
                    workflow_id: workflow_id.to_string(),
                    success: true,
                    status: WorkflowStatus::Completed,
                    output: Some(output),
                    error: None,
                    dead_lettered: false,
                    duration_ms,
                },
            ),
            Ok(Err(error)) => {
                let message = format!("{:#}", error);
                self.dead_letters.push(WorkflowDeadLetter {
                    execution_id,
                    workflow_id: workflow_id.to_string(),
                    reason: DeadLetterReason::ExecutionError,
                    error: message.clone(),
                    failed_at: Utc::now(),
                    timeout_ms,
                    input: input.clone(),
                });
                (
                    ExecutionState::Failed,
                    Self::failure(
                        execution_id,
                        workflow_id,
                        WorkflowStatus::Failed,
                        message,
                        true,
                        duration_ms,
                    ),
                )
            }
            Err(_elapsed) => {
                let message = format!("execution exceeded {}ms deadline", timeout_ms);
                self.dead_letters.push(WorkflowDeadLetter {
                    execution_id,
                    workflow_id: workflow_id.to_string(),
                    reason: DeadLetterReason::Timeout,
                    error: message.clone(),
                    failed_at: Utc::now(),
                    timeout_ms,
                    input: input.clone(),
                });
                (
                    ExecutionState::TimedOut,
                    Self::failure(
                        execution_id,
                        workflow_id,
                        WorkflowStatus::TimedOut,
                        message,
                        true,
                        duration_ms,
                    ),
                )
            }
        };

        self.executions.write().await.insert(execution_id, state);
        result
    }

    async fn get_status(&self, execution_id: WorkflowExecutionId) -> Option<ExecutionState> {
        self.executions.read().await.get(&execution_id).copied()
    }

    async fn cancel(&self, _execution_id: WorkflowExecutionId) -> bool {
        // No native cancellation: only timeout-triggered abandonment.
        false
    }

    async fn dead_letters(&self) -> Vec<WorkflowDeadLetter> {
        self.dead_letters.snapshot()
    }

    async fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::FnStep;

    fn echo_workflow(id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, "echoes its input").with_step(FnStep::new(
            "echo",
            |input| async move { Ok(serde_json::json!({ "echoed": input })) },
        ))
    }

    #[tokio::test]
    async fn unregistered_workflow_fails_without_dead_letter() {
        let engine = LocalWorkflowEngine::with_defaults();
        let result = engine.execute("ghost", WorkflowInput::new()).await;

        assert!(!result.success);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(!result.dead_lettered);
        assert!(engine.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn successful_execution_threads_step_outputs() {
        let engine = LocalWorkflowEngine::with_defaults();
        let definition = WorkflowDefinition::new("pipeline", "two steps")
            .with_step(FnStep::new("first", |_| async move {
                Ok(serde_json::json!({"count": 1}))
            }))
            .with_step(FnStep::new("second", |input: serde_json::Value| async move {
                let count = input.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(serde_json::json!({"count": count + 1}))
            }));
        engine.register(definition).await.unwrap();

        let result = engine.execute("pipeline", WorkflowInput::new()).await;
        assert!(result.success);
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.output.unwrap()["count"], 2);
        assert_eq!(
            engine.get_status(result.execution_id).await,
            Some(ExecutionState::Completed)
        );
    }

    #[tokio::test]
    async fn throwing_step_fails_and_dead_letters_once() {
        let engine = LocalWorkflowEngine::with_defaults();
        let definition = WorkflowDefinition::new("explode", "always fails").with_step(FnStep::new(
            "boom",
            |_| async move { anyhow::bail!("synthetic failure") },
        ));
        engine.register(definition).await.unwrap();

        let result = engine.execute("explode", WorkflowInput::new()).await;
        assert!(!result.success);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(result.dead_lettered);
        assert!(result.error.as_deref().unwrap().contains("synthetic failure"));

        let letters = engine.dead_letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::ExecutionError);
    }

    #[tokio::test]
    async fn slow_step_times_out_and_preserves_input() {
        let engine = LocalWorkflowEngine::with_defaults();
        let definition = WorkflowDefinition::new("slow", "sleeps forever").with_step(FnStep::new(
            "sleep",
            |_| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(serde_json::Value::Null)
            },
        ));
        engine.register(definition).await.unwrap();

        let input = WorkflowInput::new()
            .with_parameter("ticket", serde_json::json!("T-42"))
            .with_timeout_ms(20);
        let result = engine.execute("slow", input).await;

        assert!(!result.success);
        assert_eq!(result.status, WorkflowStatus::TimedOut);
        assert!(result.dead_lettered);
        assert_eq!(
            engine.get_status(result.execution_id).await,
            Some(ExecutionState::TimedOut)
        );

        let letters = engine.dead_letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::Timeout);
        assert_eq!(letters[0].timeout_ms, 20);
        // Original input retained for replay.
        assert_eq!(
            letters[0].input.parameters.get("ticket"),
            Some(&serde_json::json!("T-42"))
        );
    }

    #[tokio::test]
    async fn dead_letter_ring_trims_oldest() {
        let engine = LocalWorkflowEngine::new(DEFAULT_TIMEOUT_MS, 2);
        let definition = WorkflowDefinition::new("explode", "always fails").with_step(FnStep::new(
            "boom",
            |_| async move { anyhow::bail!("failure") },
        ));
        engine.register(definition).await.unwrap();

        let mut execution_ids = Vec::new();
        for _ in 0..3 {
            let result = engine.execute("explode", WorkflowInput::new()).await;
            execution_ids.push(result.execution_id);
        }

        let letters = engine.dead_letters().await;
        assert_eq!(letters.len(), 2);
        // Oldest entry evicted.
        assert_eq!(letters[0].execution_id, execution_ids[1]);
        assert_eq!(letters[1].execution_id, execution_ids[2]);
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let engine = LocalWorkflowEngine::with_defaults();
        engine.register(echo_workflow("dup")).await.unwrap();
        let err = engine.register(echo_workflow("dup")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn closed_engine_refuses_work() {
        let engine = LocalWorkflowEngine::with_defaults();
        engine.register(echo_workflow("echo")).await.unwrap();
        engine.close().await;

        assert!(matches!(
            engine.register(echo_workflow("late")).await,
            Err(WorkflowError::Closed)
        ));
        let result = engine.execute("echo", WorkflowInput::new()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn local_cancel_is_unsupported() {
        let engine = LocalWorkflowEngine::with_defaults();
        assert!(!engine.cancel(WorkflowExecutionId::new()).await);
    }
}
