// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution Plan Domain Model
//!
//! A plan is the planner role's output: the goals a request serves and the
//! ordered tool-call steps that realize them. Step dependencies form a DAG,
//! validated at construction rather than assumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::goal::GoalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

/// A single tool-call step in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub tool_name: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Planner output: goals plus an acyclic step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub goals: Vec<GoalId>,
    pub steps: Vec<PlanStep>,
    pub created_at: DateTime<Utc>,
    pub status: PlanStatus,
}

impl ExecutionPlan {
    /// Create a plan, validating that step ids are unique, dependencies
    /// reference existing steps, and the dependency graph is acyclic.
    pub fn new(goals: Vec<GoalId>, steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        let mut ids = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(PlanError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in &steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Self::check_for_cycles(&steps)?;

        Ok(Self {
            id: PlanId::new(),
            goals,
            steps,
            created_at: Utc::now(),
            status: PlanStatus::Pending,
        })
    }

    /// Steps in a dependency-respecting order (Kahn's algorithm). The
    /// constructor guarantees acyclicity, so this cannot fail after `new`.
    pub fn ordered_steps(&self) -> Vec<&PlanStep> {
        let by_id: HashMap<&str, &PlanStep> =
            self.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut in_degree: HashMap<&str, usize> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step.id.as_str());
            }
        }

        // Seed with declaration order so independent steps keep a stable
        // deterministic ordering.
        let mut ready: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.id.as_str())
            .collect();
        let mut ordered = Vec::with_capacity(self.steps.len());
        while let Some(id) = ready.first().copied() {
            ready.remove(0);
            ordered.push(by_id[id]);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }
        ordered
    }

    fn check_for_cycles(steps: &[PlanStep]) -> Result<(), PlanError> {
        let deps: HashMap<&str, &[String]> = steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.as_slice()))
            .collect();

        fn visit<'a>(
            current: &'a str,
            deps: &HashMap<&'a str, &'a [String]>,
            visited: &mut HashSet<&'a str>,
            rec_stack: &mut HashSet<&'a str>,
        ) -> bool {
            visited.insert(current);
            rec_stack.insert(current);
            for dep in deps.get(current).copied().into_iter().flatten() {
                if !visited.contains(dep.as_str()) {
                    if visit(dep, deps, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(dep.as_str()) {
                    return true;
                }
            }
            rec_stack.remove(current);
            false
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for step in steps {
            if !visited.contains(step.id.as_str())
                && visit(step.id.as_str(), &deps, &mut visited, &mut rec_stack)
            {
                return Err(PlanError::DependencyCycle(step.id.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Dependency cycle detected involving step '{0}'")]
    DependencyCycle(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            tool_name: "noop".to_string(),
            params: serde_json::json!({}),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_dependency_cycle() {
        let result = ExecutionPlan::new(
            vec![],
            vec![step("a", &["b"]), step("b", &["c"]), step("c", &["a"])],
        );
        assert!(matches!(result, Err(PlanError::DependencyCycle(_))));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let result = ExecutionPlan::new(vec![], vec![step("a", &["missing"])]);
        assert!(matches!(result, Err(PlanError::UnknownDependency { .. })));
    }

    #[test]
    fn rejects_duplicate_step_id() {
        let result = ExecutionPlan::new(vec![], vec![step("a", &[]), step("a", &[])]);
        assert!(matches!(result, Err(PlanError::DuplicateStepId(_))));
    }

    #[test]
    fn orders_steps_by_dependencies() {
        let plan = ExecutionPlan::new(
            vec![],
            vec![step("deploy", &["build", "test"]), step("build", &[]), step("test", &["build"])],
        )
        .unwrap();

        let order: Vec<&str> = plan.ordered_steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["build", "test", "deploy"]);
    }

    #[test]
    fn new_plan_is_pending() {
        let plan = ExecutionPlan::new(vec![], vec![step("only", &[])]).unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.steps.len(), 1);
    }
}
