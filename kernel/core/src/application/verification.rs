// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Verification Application Services
//!
//! Static and post-hoc validation of tool calls: the tool registry (with
//! domain-pack load/unload), the statically-typed schema validator, the
//! post-condition verifier, and the invariant checker. The verifier role
//! composes all three; `overall_passed` requires all three to pass.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use crate::domain::tool::{
    DomainPack, Invariant, InvariantRule, IssueSeverity, PostCondition, PostConditionCheck,
    ToolCall, ToolContract, ValidationIssue,
};
use crate::domain::verification::CheckResult;

/// Result of executing one plan step, as seen by the verifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub tool_name: String,
    pub success: bool,
    pub output: serde_json::Value,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Registry of tool contracts and invariants, fed by domain packs.
///
/// Loading a pack wires its tools and invariants in; unloading reverses
/// both. Explicitly constructed and injected, never global.
pub struct ToolRegistry {
    contracts: RwLock<HashMap<String, ToolContract>>,
    invariants: RwLock<Vec<(String, Invariant)>>,
    packs: RwLock<Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
            invariants: RwLock::new(Vec::new()),
            packs: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, contract: ToolContract) {
        self.contracts
            .write()
            .insert(contract.name.clone(), contract);
    }

    pub fn register_invariant(&self, invariant: Invariant) {
        self.invariants
            .write()
            .push(("<unpacked>".to_string(), invariant));
    }

    pub fn load_pack(&self, pack: &DomainPack) {
        info!(pack = %pack.name, tools = pack.tool_contracts.len(), "Loading domain pack");
        {
            let mut contracts = self.contracts.write();
            for contract in &pack.tool_contracts {
                contracts.insert(contract.name.clone(), contract.clone());
            }
        }
        {
            let mut invariants = self.invariants.write();
            for invariant in &pack.invariants {
                invariants.push((pack.name.clone(), invariant.clone()));
            }
        }
        self.packs.write().push(pack.name.clone());
    }

    pub fn unload_pack(&self, pack: &DomainPack) {
        info!(pack = %pack.name, "Unloading domain pack");
        {
            let mut contracts = self.contracts.write();
            for contract in &pack.tool_contracts {
                contracts.remove(&contract.name);
            }
        }
        self.invariants
            .write()
            .retain(|(owner, _)| owner != &pack.name);
        self.packs.write().retain(|name| name != &pack.name);
    }

    pub fn get(&self, tool_name: &str) -> Option<ToolContract> {
        self.contracts.read().get(tool_name).cloned()
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.contracts.read().contains_key(tool_name)
    }

    pub fn invariants(&self) -> Vec<Invariant> {
        self.invariants
            .read()
            .iter()
            .map(|(_, inv)| inv.clone())
            .collect()
    }

    pub fn loaded_packs(&self) -> Vec<String> {
        self.packs.read().clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Statically-typed schema validation producing the structured issue list
/// `{field, code, message, severity}`.
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(contract: &ToolContract, call: &ToolCall) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let Some(params) = call.params.as_object() else {
            issues.push(ValidationIssue {
                field: "params".to_string(),
                code: "not_an_object".to_string(),
                message: "tool parameters must be a JSON object".to_string(),
                severity: IssueSeverity::Critical,
            });
            return issues;
        };

        for spec in &contract.params {
            match params.get(&spec.name) {
                None if spec.required => issues.push(ValidationIssue {
                    field: spec.name.clone(),
                    code: "missing_required".to_string(),
                    message: format!("required parameter '{}' missing", spec.name),
                    severity: IssueSeverity::Critical,
                }),
                None => {}
                Some(value) if !spec.kind.matches(value) => issues.push(ValidationIssue {
                    field: spec.name.clone(),
                    code: "type_mismatch".to_string(),
                    message: format!("parameter '{}' must be a {}", spec.name, spec.kind),
                    severity: IssueSeverity::Critical,
                }),
                Some(_) => {}
            }
        }

        let declared: Vec<&str> = contract.params.iter().map(|p| p.name.as_str()).collect();
        for key in params.keys() {
            if !declared.contains(&key.as_str()) {
                issues.push(ValidationIssue {
                    field: key.clone(),
                    code: "unknown_parameter".to_string(),
                    message: format!("parameter '{}' is not declared by '{}'", key, contract.name),
                    severity: IssueSeverity::Warning,
                });
            }
        }

        issues
    }
}

fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Runs declared post-conditions against step outputs.
pub struct PostConditionVerifier;

impl PostConditionVerifier {
    pub fn verify(conditions: &[PostCondition], results: &[StepResult]) -> Vec<CheckResult> {
        conditions
            .iter()
            .map(|condition| {
                let passed = results
                    .iter()
                    .all(|result| Self::check(&condition.check, &result.output));
                CheckResult {
                    name: condition.name.clone(),
                    passed,
                    severity: condition.severity,
                    detail: (!passed).then(|| format!("post-condition '{}' failed", condition.name)),
                }
            })
            .collect()
    }

    fn check(check: &PostConditionCheck, output: &serde_json::Value) -> bool {
        match check {
            PostConditionCheck::FieldPresent { path } => lookup_path(output, path).is_some(),
            PostConditionCheck::FieldAbsent { path } => lookup_path(output, path).is_none(),
            PostConditionCheck::FieldEquals { path, value } => {
                lookup_path(output, path) == Some(value)
            }
            PostConditionCheck::FieldAtLeast { path, min } => lookup_path(output, path)
                .and_then(|v| v.as_f64())
                .map(|v| v >= *min)
                .unwrap_or(false),
        }
    }
}

/// Checks registered invariants against the whole executed request.
pub struct InvariantChecker;

impl InvariantChecker {
    pub fn check(
        invariants: &[Invariant],
        registry: &ToolRegistry,
        results: &[StepResult],
    ) -> Vec<CheckResult> {
        invariants
            .iter()
            .map(|invariant| {
                let (passed, detail) = Self::evaluate(&invariant.rule, registry, results);
                CheckResult {
                    name: invariant.name.clone(),
                    passed,
                    severity: invariant.severity,
                    detail,
                }
            })
            .collect()
    }

    fn evaluate(
        rule: &InvariantRule,
        registry: &ToolRegistry,
        results: &[StepResult],
    ) -> (bool, Option<String>) {
        match rule {
            InvariantRule::OnlyRegisteredTools => {
                let offender = results.iter().find(|r| !registry.contains(&r.tool_name));
                match offender {
                    Some(r) => (
                        false,
                        Some(format!("tool '{}' is not registered", r.tool_name)),
                    ),
                    None => (true, None),
                }
            }
            InvariantRule::MaxSteps { max } => {
                let ok = results.len() <= *max;
                (
                    ok,
                    (!ok).then(|| format!("{} steps executed, max {}", results.len(), max)),
                )
            }
            InvariantRule::MaxTotalDurationMs { max } => {
                let total: u64 = results.iter().map(|r| r.duration_ms).sum();
                let ok = total <= *max;
                (
                    ok,
                    (!ok).then(|| format!("total duration {}ms exceeds budget {}ms", total, max)),
                )
            }
            InvariantRule::NoFailedSteps => {
                let offender = results.iter().find(|r| !r.success);
                match offender {
                    Some(r) => (false, Some(format!("step '{}' failed", r.step_id))),
                    None => (true, None),
                }
            }
        }
    }
}
