// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool Contract Domain Model
//!
//! Statically-typed tool contracts, the calls made against them, and the
//! domain packs that bundle contracts with invariants and safe-mode triggers
//! for a specific application domain.

use serde::{Deserialize, Serialize};

/// Parameter kinds a tool contract can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        };
        write!(f, "{}", s)
    }
}

/// One declared parameter of a tool contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// A tool's declared interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContract {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

/// A concrete invocation to validate against a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Warning,
}

/// Structured validation issue: field, code, message, severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
}

/// A post-condition checked after a tool call resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCondition {
    pub name: String,
    pub check: PostConditionCheck,
    pub severity: IssueSeverity,
}

/// Declarative checks against a step's output JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum PostConditionCheck {
    /// Output must contain this field (dot-separated path).
    FieldPresent { path: String },
    /// Output field must equal this value.
    FieldEquals { path: String, value: serde_json::Value },
    /// Numeric output field must be at least this value.
    FieldAtLeast { path: String, min: f64 },
    /// Output must not contain this field.
    FieldAbsent { path: String },
}

/// A system invariant checked continuously across the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    pub description: String,
    pub rule: InvariantRule,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum InvariantRule {
    /// No executed step may have called a tool outside the registry.
    OnlyRegisteredTools,
    /// Total executed steps must not exceed this count.
    MaxSteps { max: usize },
    /// Cumulative step duration must not exceed this budget.
    MaxTotalDurationMs { max: u64 },
    /// No step result may report `success: false`.
    NoFailedSteps,
}

/// Externally supplied bundle wiring a domain's tools and invariants into
/// the kernel registries. Unloading reverses the wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainPack {
    pub name: String,
    pub tool_contracts: Vec<ToolContract>,
    pub invariants: Vec<Invariant>,
    #[serde(default)]
    pub benchmarks: Vec<String>,
    #[serde(default)]
    pub safe_mode_triggers: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
