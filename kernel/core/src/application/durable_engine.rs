// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Durable Workflow Engine
//!
//! Layers the [`WorkflowEngine`] contract over an external durable-execution
//! service (Temporal). The backend owns run durability; this engine owns the
//! kernel-side contract: idempotent-start reattachment, timeout layering,
//! and dead-letter retention.
//!
//! # Restart Survivability
//!
//! If the backend reports a run already exists for the requested workflow id
//! (the idempotent-start error class), `execute` *reattaches* to the
//! existing run instead of failing. This makes `execute` safe to call again
//! after an adapter crash/restart, provided the definition pins a fixed
//! `workflow_id` rather than relying on the per-execution random id.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::workflow_engine::{
    DeadLetterBuffer, WorkflowEngine, DEFAULT_MAX_DEAD_LETTERS, DEFAULT_TIMEOUT_MS,
};
use crate::domain::workflow::{
    DeadLetterReason, ExecutionState, WorkflowDeadLetter, WorkflowDefinition, WorkflowError,
    WorkflowExecutionId, WorkflowInput, WorkflowResult, WorkflowStatus,
};

/// Opaque handle to a backend run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub workflow_id: String,
    pub run_id: String,
}

/// Terminal outcome reported by the backend for a run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { output: serde_json::Value },
    Failed { error: String },
}

/// Start failures, split into the idempotent "already running" class the
/// engine recovers from and everything else.
#[derive(Debug, thiserror::Error)]
pub enum StartRunError {
    #[error("Workflow '{workflow_id}' already started")]
    AlreadyStarted { workflow_id: String },

    #[error("Backend rejected start: {0}")]
    Rejected(String),

    #[error("Backend transport error: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Run not found for workflow '{0}'")]
    NotFound(String),

    #[error("Backend transport error: {0}")]
    Transport(String),

    #[error("Result deadline exceeded")]
    Deadline,
}

/// Contract for a durable-execution backend adapter.
///
/// Resolved at construction as an explicit plugin registration: absence of
/// the backend is a configuration-time decision, never a runtime throw from
/// inside a method.
#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Start a new durable run for `workflow_id` with the given input.
    async fn start_run(
        &self,
        workflow_id: &str,
        input: &serde_json::Value,
    ) -> Result<RunHandle, StartRunError>;

    /// Look up the existing run for a workflow id (reattachment path).
    async fn attach_run(&self, workflow_id: &str) -> Result<RunHandle, BackendError>;

    /// Await the run's terminal outcome, up to `deadline`.
    async fn await_result(
        &self,
        handle: &RunHandle,
        deadline: Duration,
    ) -> Result<RunOutcome, BackendError>;

    /// Best-effort cancellation of the underlying run.
    async fn cancel_run(&self, handle: &RunHandle) -> Result<bool, BackendError>;
}

#[derive(Clone)]
struct DurableRegistration {
    pinned_workflow_id: Option<String>,
}

/// Temporal-backed engine variant.
pub struct TemporalWorkflowEngine {
    backend: Arc<dyn DurableBackend>,
    registrations: RwLock<HashMap<String, DurableRegistration>>,
    executions: RwLock<HashMap<WorkflowExecutionId, (ExecutionState, RunHandle)>>,
    dead_letters: Arc<DeadLetterBuffer>,
    default_timeout_ms: u64,
    closed: Mutex<bool>,
}

impl TemporalWorkflowEngine {
    pub fn new(backend: Arc<dyn DurableBackend>, default_timeout_ms: u64, max_dead_letters: usize) -> Self {
        Self {
            backend,
            registrations: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            dead_letters: Arc::new(DeadLetterBuffer::new(max_dead_letters)),
            default_timeout_ms,
            closed: Mutex::new(false),
        }
    }

    pub fn with_defaults(backend: Arc<dyn DurableBackend>) -> Self {
        Self::new(backend, DEFAULT_TIMEOUT_MS, DEFAULT_MAX_DEAD_LETTERS)
    }

    fn dead_letter(
        &self,
        execution_id: WorkflowExecutionId,
        workflow_id: &str,
        reason: DeadLetterReason,
        error: String,
        timeout_ms: u64,
        input: &WorkflowInput,
    ) {
        self.dead_letters.push(WorkflowDeadLetter {
            execution_id,
            workflow_id: workflow_id.to_string(),
            reason,
            error,
            failed_at: Utc::now(),
            timeout_ms,
            input: input.clone(),
        });
    }
}

#[async_trait]
impl WorkflowEngine for TemporalWorkflowEngine {
    async fn register(&self, definition: WorkflowDefinition) -> Result<(), WorkflowError> {
        if *self.closed.lock() {
            return Err(WorkflowError::Closed);
        }
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&definition.id) {
            return Err(WorkflowError::AlreadyRegistered(definition.id.clone()));
        }
        info!(
            workflow_id = %definition.id,
            pinned = definition.pinned_workflow_id.as_deref().unwrap_or("<per-execution>"),
            "Registering durable workflow"
        );
        registrations.insert(
            definition.id.clone(),
            DurableRegistration {
                pinned_workflow_id: definition.pinned_workflow_id.clone(),
            },
        );
        Ok(())
    }

    async fn execute(&self, workflow_id: &str, input: WorkflowInput) -> WorkflowResult {
        let execution_id = WorkflowExecutionId::new();
        let started = Instant::now();

        if *self.closed.lock() {
            return WorkflowResult {
                execution_id,
                workflow_id: workflow_id.to_string(),
                success: false,
                status: WorkflowStatus::Failed,
                output: None,
                error: Some("engine is closed".to_string()),
                dead_lettered: false,
                duration_ms: 0,
            };
        }

        let Some(registration) = self.registrations.read().await.get(workflow_id).cloned() else {
            return WorkflowResult {
                execution_id,
                workflow_id: workflow_id.to_string(),
                success: false,
                status: WorkflowStatus::Failed,
                output: None,
                error: Some(format!("workflow '{}' is not registered", workflow_id)),
                dead_lettered: false,
                duration_ms: 0,
            };
        };

        let timeout_ms = input.timeout_ms.unwrap_or(self.default_timeout_ms);
        // Restart-survivable definitions pin a fixed external id; otherwise
        // each execution gets its own run id and reattachment cannot apply.
        let external_id = registration
            .pinned_workflow_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", workflow_id, execution_id));

        let handle = match self.backend.start_run(&external_id, &input.payload()).await {
            Ok(handle) => handle,
            Err(StartRunError::AlreadyStarted { .. }) => {
                // Idempotent-start recovery: reattach to the existing run
                // rather than failing, so a crashed adapter can resume.
                info!(workflow_id = %external_id, "Run already started; reattaching");
                match self.backend.attach_run(&external_id).await {
                    Ok(handle) => handle,
                    Err(error) => {
                        let message = format!("reattach failed: {}", error);
                        self.dead_letter(
                            execution_id,
                            workflow_id,
                            DeadLetterReason::StartError,
                            message.clone(),
                            timeout_ms,
                            &input,
                        );
                        return WorkflowResult {
                            execution_id,
                            workflow_id: workflow_id.to_string(),
                            success: false,
                            status: WorkflowStatus::Failed,
                            output: None,
                            error: Some(message),
                            dead_lettered: true,
                            duration_ms: started.elapsed().as_millis() as u64,
                        };
                    }
                }
            }
            Err(error) => {
                // Non-idempotent start failures are fatal and dead-lettered.
                let message = error.to_string();
                warn!(workflow_id = %external_id, error = %message, "Durable start failed");
                self.dead_letter(
                    execution_id,
                    workflow_id,
                    DeadLetterReason::StartError,
                    message.clone(),
                    timeout_ms,
                    &input,
                );
                return WorkflowResult {
                    execution_id,
                    workflow_id: workflow_id.to_string(),
                    success: false,
                    status: WorkflowStatus::Failed,
                    output: None,
                    error: Some(message),
                    dead_lettered: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        self.executions
            .write()
            .await
            .insert(execution_id, (ExecutionState::Running, handle.clone()));

        let outcome = self
            .backend
            .await_result(&handle, Duration::from_millis(timeout_ms))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (state, result) = match outcome {
            Ok(RunOutcome::Completed { output }) => (
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
            Ok(RunOutcome::Failed { error }) => {
                self.dead_letter(
                    execution_id,
                    workflow_id,
                    DeadLetterReason::ExecutionError,
                    error.clone(),
                    timeout_ms,
                    &input,
                );
                (
                    ExecutionState::Failed,
                    WorkflowResult {
                        execution_id,
                        workflow_id: workflow_id.to_string(),
                        success: false,
                        status: WorkflowStatus::Failed,
                        output: None,
                        error: Some(error),
                        dead_lettered: true,
                        duration_ms,
                    },
                )
            }
            Err(BackendError::Deadline) => {
                let message = format!("durable run exceeded {}ms deadline", timeout_ms);
                self.dead_letter(
                    execution_id,
                    workflow_id,
                    DeadLetterReason::Timeout,
                    message.clone(),
                    timeout_ms,
                    &input,
                );
                (
                    ExecutionState::TimedOut,
                    WorkflowResult {
                        execution_id,
                        workflow_id: workflow_id.to_string(),
                        success: false,
                        status: WorkflowStatus::TimedOut,
                        output: None,
                        error: Some(message),
                        dead_lettered: true,
                        duration_ms,
                    },
                )
            }
            Err(error) => {
                let message = error.to_string();
                self.dead_letter(
                    execution_id,
                    workflow_id,
                    DeadLetterReason::ExecutionError,
                    message.clone(),
                    timeout_ms,
                    &input,
                );
                (
                    ExecutionState::Failed,
                    WorkflowResult {
                        execution_id,
                        workflow_id: workflow_id.to_string(),
                        success: false,
                        status: WorkflowStatus::Failed,
                        output: None,
                        error: Some(message),
                        dead_lettered: true,
                        duration_ms,
                    },
                )
            }
        };

        self.executions
            .write()
            .await
            .insert(execution_id, (state, handle));
        result
    }

    async fn get_status(&self, execution_id: WorkflowExecutionId) -> Option<ExecutionState> {
        self.executions
            .read()
            .await
            .get(&execution_id)
            .map(|(state, _)| *state)
    }

    async fn cancel(&self, execution_id: WorkflowExecutionId) -> bool {
        let handle = {
            let executions = self.executions.read().await;
            match executions.get(&execution_id) {
                Some((ExecutionState::Running, handle)) => handle.clone(),
                _ => return false,
            }
        };

        match self.backend.cancel_run(&handle).await {
            Ok(true) => {
                self.executions
                    .write()
                    .await
                    .insert(execution_id, (ExecutionState::Cancelled, handle));
                true
            }
            Ok(false) => false,
            Err(error) => {
                warn!(execution_id = %execution_id, error = %error, "Cancel failed");
                false
            }
        }
    }

    async fn dead_letters(&self) -> Vec<WorkflowDeadLetter> {
        self.dead_letters.snapshot()
    }

    async fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registrations.read().await.keys().cloned().collect();
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double simulating a durable service that remembers runs
    /// across adapter instances (shared state = external durability).
    #[derive(Default)]
    struct FakeBackend {
        runs: Mutex<HashMap<String, RunOutcome>>,
        starts: AtomicUsize,
        attaches: AtomicUsize,
    }

    #[async_trait]
    impl DurableBackend for FakeBackend {
        async fn start_run(
            &self,
            workflow_id: &str,
            input: &serde_json::Value,
        ) -> Result<RunHandle, StartRunError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let mut runs = self.runs.lock();
            if runs.contains_key(workflow_id) {
                return Err(StartRunError::AlreadyStarted {
                    workflow_id: workflow_id.to_string(),
                });
            }
            runs.insert(
                workflow_id.to_string(),
                RunOutcome::Completed {
                    output: serde_json::json!({"echo": input}),
                },
            );
            Ok(RunHandle {
                workflow_id: workflow_id.to_string(),
                run_id: "run-1".to_string(),
            })
        }

        async fn attach_run(&self, workflow_id: &str) -> Result<RunHandle, BackendError> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            if self.runs.lock().contains_key(workflow_id) {
                Ok(RunHandle {
                    workflow_id: workflow_id.to_string(),
                    run_id: "run-1".to_string(),
                })
            } else {
                Err(BackendError::NotFound(workflow_id.to_string()))
            }
        }

        async fn await_result(
            &self,
            handle: &RunHandle,
            _deadline: Duration,
        ) -> Result<RunOutcome, BackendError> {
            self.runs
                .lock()
                .get(&handle.workflow_id)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(handle.workflow_id.clone()))
        }

        async fn cancel_run(&self, handle: &RunHandle) -> Result<bool, BackendError> {
            Ok(self.runs.lock().remove(&handle.workflow_id).is_some())
        }
    }

    fn pinned_definition(id: &str, external: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, "durable").with_pinned_workflow_id(external)
    }

    #[tokio::test]
    async fn already_started_reattaches_for_fresh_adapter() {
        let backend = Arc::new(FakeBackend::default());

        let first = TemporalWorkflowEngine::with_defaults(backend.clone());
        first
            .register(pinned_definition("sync", "sync-fixed"))
            .await
            .unwrap();
        let result = first.execute("sync", WorkflowInput::new()).await;
        assert!(result.success);
        assert_eq!(backend.attaches.load(Ordering::SeqCst), 0);

        // Simulated process restart: a new adapter instance against the same
        // externally durable backend, same fixed workflow id.
        let second = TemporalWorkflowEngine::with_defaults(backend.clone());
        second
            .register(pinned_definition("sync", "sync-fixed"))
            .await
            .unwrap();
        let resumed = second.execute("sync", WorkflowInput::new()).await;

        assert!(resumed.success, "reattach must return the existing run's output");
        assert_eq!(resumed.status, WorkflowStatus::Completed);
        assert_eq!(backend.attaches.load(Ordering::SeqCst), 1);
        assert!(second.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_start_is_dead_lettered_fatal() {
        struct RejectingBackend;

        #[async_trait]
        impl DurableBackend for RejectingBackend {
            async fn start_run(
                &self,
                _workflow_id: &str,
                _input: &serde_json::Value,
            ) -> Result<RunHandle, StartRunError> {
                Err(StartRunError::Rejected("namespace quota exhausted".to_string()))
            }
            async fn attach_run(&self, workflow_id: &str) -> Result<RunHandle, BackendError> {
                Err(BackendError::NotFound(workflow_id.to_string()))
            }
            async fn await_result(
                &self,
                _handle: &RunHandle,
                _deadline: Duration,
            ) -> Result<RunOutcome, BackendError> {
                unreachable!("start never succeeds")
            }
            async fn cancel_run(&self, _handle: &RunHandle) -> Result<bool, BackendError> {
                Ok(false)
            }
        }

        let engine = TemporalWorkflowEngine::with_defaults(Arc::new(RejectingBackend));
        engine
            .register(pinned_definition("doomed", "doomed-fixed"))
            .await
            .unwrap();

        let result = engine.execute("doomed", WorkflowInput::new()).await;
        assert!(!result.success);
        assert!(result.dead_lettered);

        let letters = engine.dead_letters().await;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::StartError);
    }

    #[tokio::test]
    async fn backend_deadline_maps_to_timed_out() {
        struct StallingBackend;

        #[async_trait]
        impl DurableBackend for StallingBackend {
            async fn start_run(
                &self,
                workflow_id: &str,
                _input: &serde_json::Value,
            ) -> Result<RunHandle, StartRunError> {
                Ok(RunHandle {
                    workflow_id: workflow_id.to_string(),
                    run_id: "run-1".to_string(),
                })
            }
            async fn attach_run(&self, workflow_id: &str) -> Result<RunHandle, BackendError> {
                Err(BackendError::NotFound(workflow_id.to_string()))
            }
            async fn await_result(
                &self,
                _handle: &RunHandle,
                _deadline: Duration,
            ) -> Result<RunOutcome, BackendError> {
                Err(BackendError::Deadline)
            }
            async fn cancel_run(&self, _handle: &RunHandle) -> Result<bool, BackendError> {
                Ok(true)
            }
        }

        let engine = TemporalWorkflowEngine::with_defaults(Arc::new(StallingBackend));
        engine.register(WorkflowDefinition::new("stall", "never finishes")).await.unwrap();

        let result = engine
            .execute("stall", WorkflowInput::new().with_timeout_ms(50))
            .await;
        assert_eq!(result.status, WorkflowStatus::TimedOut);
        assert!(result.dead_lettered);
        assert_eq!(engine.dead_letters().await[0].reason, DeadLetterReason::Timeout);
    }

    #[tokio::test]
    async fn cancel_is_best_effort_on_running_runs() {
        let engine = TemporalWorkflowEngine::with_defaults(Arc::new(FakeBackend::default()));
        // Unknown execution id: nothing to cancel.
        assert!(!engine.cancel(WorkflowExecutionId::new()).await);
    }
}
