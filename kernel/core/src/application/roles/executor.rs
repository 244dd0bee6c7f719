// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Executor Role
//!
//! Runs a plan's steps in dependency order through the host-injected action
//! handler. Steps whose tool name carries the `workflow:` prefix delegate to
//! the workflow engine for durable multi-step execution. Step failures are
//! structured results; execution halts at the first failure and the
//! remaining steps are not run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::application::roles::{ExecutorRole, RoleError};
use crate::application::verification::StepResult;
use crate::application::workflow_engine::WorkflowEngine;
use crate::domain::plan::ExecutionPlan;
use crate::domain::tool::ToolCall;
use crate::domain::workflow::WorkflowInput;

/// Prefix marking a plan step as a workflow delegation.
pub const WORKFLOW_TOOL_PREFIX: &str = "workflow:";

/// Output of one host-side tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub result: serde_json::Value,
    pub duration_ms: u64,
}

/// Injected by the hosting runtime to actually perform tool side effects.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, call: &ToolCall) -> anyhow::Result<ActionOutput>;
}

pub struct InProcessExecutor {
    handler: Arc<dyn ActionHandler>,
    workflow_engine: Option<Arc<dyn WorkflowEngine>>,
}

impl InProcessExecutor {
    pub fn new(
        handler: Arc<dyn ActionHandler>,
        workflow_engine: Option<Arc<dyn WorkflowEngine>>,
    ) -> Self {
        Self {
            handler,
            workflow_engine,
        }
    }

    async fn run_workflow_step(
        &self,
        step_id: &str,
        workflow_id: &str,
        params: &serde_json::Value,
    ) -> Result<StepResult, RoleError> {
        let Some(engine) = &self.workflow_engine else {
            return Err(RoleError::Execution(format!(
                "step '{}' requires a workflow engine, but none is configured",
                step_id
            )));
        };

        let mut input = WorkflowInput::new();
        if let Some(object) = params.as_object() {
            for (key, value) in object {
                if key == "timeout_ms" {
                    input.timeout_ms = value.as_u64();
                } else {
                    input.parameters.insert(key.clone(), value.clone());
                }
            }
        }

        let result = engine.execute(workflow_id, input).await;
        Ok(StepResult {
            step_id: step_id.to_string(),
            tool_name: format!("{}{}", WORKFLOW_TOOL_PREFIX, workflow_id),
            success: result.success,
            output: result.output.unwrap_or(serde_json::Value::Null),
            duration_ms: result.duration_ms,
            error: result.error,
        })
    }
}

#[async_trait]
impl ExecutorRole for InProcessExecutor {
    async fn execute(&self, plan: &ExecutionPlan) -> Result<Vec<StepResult>, RoleError> {
        let mut results = Vec::with_capacity(plan.steps.len());

        for step in plan.ordered_steps() {
            debug!(step_id = %step.id, tool = %step.tool_name, "Executing plan step");

            let result = if let Some(workflow_id) = step.tool_name.strip_prefix(WORKFLOW_TOOL_PREFIX)
            {
                self.run_workflow_step(&step.id, workflow_id, &step.params)
                    .await?
            } else {
                let call = ToolCall {
                    tool_name: step.tool_name.clone(),
                    params: step.params.clone(),
                };
                let started = Instant::now();
                match self.handler.handle(&call).await {
                    Ok(output) => StepResult {
                        step_id: step.id.clone(),
                        tool_name: step.tool_name.clone(),
                        success: true,
                        output: output.result,
                        duration_ms: output.duration_ms,
                        error: None,
                    },
                    Err(error) => StepResult {
                        step_id: step.id.clone(),
                        tool_name: step.tool_name.clone(),
                        success: false,
                        output: serde_json::Value::Null,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: Some(format!("{:#}", error)),
                    },
                }
            };

            let failed = !result.success;
            results.push(result);
            if failed {
                warn!(plan_id = %plan.id, "Step failed; halting plan execution");
                break;
            }
        }

        Ok(results)
    }
}
