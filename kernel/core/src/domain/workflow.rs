// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Domain Model
//!
//! A workflow is a named, registered multi-step plan executed by one of the
//! engine backends (in-process or durable). Steps are opaque async callables
//! supplied by the host; the kernel owns timeout and dead-letter semantics.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecutionId(pub Uuid);

impl WorkflowExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One step of a registered workflow.
#[async_trait::async_trait]
pub trait WorkflowStep: Send + Sync {
    fn name(&self) -> &str;

    /// Receives the previous step's output (or the workflow input for the
    /// first step) and returns its own output.
    async fn execute(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

type StepFuture = BoxFuture<'static, anyhow::Result<serde_json::Value>>;
type StepFn = dyn Fn(serde_json::Value) -> StepFuture + Send + Sync;

/// Adapter turning an async closure into a [`WorkflowStep`].
pub struct FnStep {
    name: String,
    func: Arc<StepFn>,
}

impl FnStep {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |input| Box::pin(func(input))),
        }
    }
}

#[async_trait::async_trait]
impl WorkflowStep for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        (self.func)(input).await
    }
}

/// A registered workflow definition.
#[derive(Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub description: String,
    pub steps: Vec<Arc<dyn WorkflowStep>>,
    /// Fixed external run id for restart-survivable durable workflows. A
    /// definition without one gets a fresh random run id per execution.
    pub pinned_workflow_id: Option<String>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            steps: Vec::new(),
            pinned_workflow_id: None,
        }
    }

    pub fn with_step(mut self, step: impl WorkflowStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn with_pinned_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.pinned_workflow_id = Some(workflow_id.into());
        self
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("pinned_workflow_id", &self.pinned_workflow_id)
            .finish()
    }
}

/// Input to a workflow execution. `timeout_ms` overrides the engine default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl WorkflowInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(&self.parameters).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
    TimedOut,
}

/// Live view of an execution, for `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// Terminal result of a workflow execution. Callers always receive one of
/// these; engine internals never surface raw faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: WorkflowExecutionId,
    pub workflow_id: String,
    pub success: bool,
    pub status: WorkflowStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub dead_lettered: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    Timeout,
    ExecutionError,
    StartError,
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeadLetterReason::Timeout => "timeout",
            DeadLetterReason::ExecutionError => "execution_error",
            DeadLetterReason::StartError => "start_error",
        };
        write!(f, "{}", s)
    }
}

/// Retained record of a failed/timed-out/unstartable execution, preserving
/// the original input for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDeadLetter {
    pub execution_id: WorkflowExecutionId,
    pub workflow_id: String,
    pub reason: DeadLetterReason,
    pub error: String,
    pub failed_at: DateTime<Utc>,
    pub timeout_ms: u64,
    pub input: WorkflowInput,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow '{0}' is not registered")]
    NotRegistered(String),

    #[error("Workflow '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Workflow '{0}' has no steps")]
    NoSteps(String),

    #[error("Engine is closed")]
    Closed,
}
