// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Verifier Role
//!
//! Composes the three verification layers over an executed plan: schema
//! validation of every step's tool call against its registered contract,
//! post-condition checks on step outputs, and invariant checks over the
//! whole request. `overall_passed` requires all three.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::application::roles::{RoleError, VerifierRole};
use crate::application::verification::{
    InvariantChecker, PostConditionVerifier, SchemaValidator, StepResult, ToolRegistry,
};
use crate::domain::plan::ExecutionPlan;
use crate::domain::tool::{IssueSeverity, PostCondition, ToolCall, ValidationIssue};
use crate::domain::verification::VerificationReport;

pub struct InProcessVerifier {
    registry: Arc<ToolRegistry>,
    post_conditions: RwLock<Vec<PostCondition>>,
}

impl InProcessVerifier {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            post_conditions: RwLock::new(Vec::new()),
        }
    }

    pub fn add_post_condition(&self, condition: PostCondition) {
        self.post_conditions.write().push(condition);
    }
}

#[async_trait]
impl VerifierRole for InProcessVerifier {
    async fn verify(
        &self,
        plan: &ExecutionPlan,
        results: &[StepResult],
    ) -> Result<VerificationReport, RoleError> {
        let mut schema_issues: Vec<ValidationIssue> = Vec::new();
        for step in &plan.steps {
            // Workflow delegations are validated by the engine's own
            // registration, not a tool contract.
            if step.tool_name.starts_with("workflow:") {
                continue;
            }
            match self.registry.get(&step.tool_name) {
                Some(contract) => {
                    let call = ToolCall {
                        tool_name: step.tool_name.clone(),
                        params: step.params.clone(),
                    };
                    schema_issues.extend(SchemaValidator::validate(&contract, &call));
                }
                None => schema_issues.push(ValidationIssue {
                    field: step.tool_name.clone(),
                    code: "unknown_tool".to_string(),
                    message: format!("tool '{}' has no registered contract", step.tool_name),
                    severity: IssueSeverity::Critical,
                }),
            }
        }

        let post_conditions =
            PostConditionVerifier::verify(&self.post_conditions.read(), results);
        let invariants =
            InvariantChecker::check(&self.registry.invariants(), &self.registry, results);

        let report = VerificationReport::from_parts(schema_issues, post_conditions, invariants);
        debug!(
            plan_id = %plan.id,
            status = ?report.status,
            overall_passed = report.overall_passed,
            "Verification complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::PlanStep;
    use crate::domain::tool::{
        Invariant, InvariantRule, ParamKind, ParamSpec, PostConditionCheck, ToolContract,
    };
    use crate::domain::verification::VerificationStatus;

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(ToolContract {
            name: "run".to_string(),
            description: "run a command".to_string(),
            params: vec![ParamSpec {
                name: "command".to_string(),
                kind: ParamKind::String,
                required: true,
                description: None,
            }],
        });
        registry.register_invariant(Invariant {
            name: "no-failures".to_string(),
            description: String::new(),
            rule: InvariantRule::NoFailedSteps,
            severity: IssueSeverity::Critical,
        });
        Arc::new(registry)
    }

    fn plan(tool: &str, params: serde_json::Value) -> ExecutionPlan {
        ExecutionPlan::new(
            vec![],
            vec![PlanStep {
                id: "s1".to_string(),
                tool_name: tool.to_string(),
                params,
                depends_on: vec![],
            }],
        )
        .unwrap()
    }

    fn ok_result() -> StepResult {
        StepResult {
            step_id: "s1".to_string(),
            tool_name: "run".to_string(),
            success: true,
            output: serde_json::json!({"exit_code": 0}),
            duration_ms: 3,
            error: None,
        }
    }

    #[tokio::test]
    async fn valid_call_passes_all_layers() {
        let verifier = InProcessVerifier::new(registry());
        verifier.add_post_condition(PostCondition {
            name: "exit-clean".to_string(),
            check: PostConditionCheck::FieldEquals {
                path: "exit_code".to_string(),
                value: serde_json::json!(0),
            },
            severity: IssueSeverity::Critical,
        });

        let report = verifier
            .verify(&plan("run", serde_json::json!({"command": "ls"})), &[ok_result()])
            .await
            .unwrap();
        assert!(report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Passed);
    }

    #[tokio::test]
    async fn unknown_tool_is_critical_schema_issue() {
        let verifier = InProcessVerifier::new(registry());
        let report = verifier
            .verify(&plan("rogue", serde_json::json!({})), &[])
            .await
            .unwrap();
        assert!(!report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Failed);
        assert_eq!(report.schema_issues[0].code, "unknown_tool");
    }

    #[tokio::test]
    async fn failed_step_breaks_invariant() {
        let verifier = InProcessVerifier::new(registry());
        let mut bad = ok_result();
        bad.success = false;

        let report = verifier
            .verify(&plan("run", serde_json::json!({"command": "ls"})), &[bad])
            .await
            .unwrap();
        assert!(!report.overall_passed);
        assert_eq!(report.status, VerificationStatus::Failed);
    }

    #[tokio::test]
    async fn workflow_steps_skip_contract_lookup() {
        let verifier = InProcessVerifier::new(registry());
        let report = verifier
            .verify(&plan("workflow:release", serde_json::json!({})), &[ok_result()])
            .await
            .unwrap();
        assert!(report.overall_passed);
    }
}
