// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Goal Domain Model
//!
//! Goals form a tree: a child's parent must already exist at creation, which
//! makes cycles impossible by construction order. Agent-sourced goals are
//! trust-gated at a fixed floor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum source trust for agent-originated goal creation.
pub const AGENT_GOAL_TRUST_FLOOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Paused,
    Failed,
}

/// Who asked for this goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSource {
    User,
    System,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub description: String,
    pub priority: u8,
    pub status: GoalStatus,
    pub parent_goal_id: Option<GoalId>,
    pub success_criteria: Vec<String>,
    pub source: GoalSource,
    pub source_trust: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation input, before the trust gate and parent check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDraft {
    pub description: String,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub parent_goal_id: Option<GoalId>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    pub source: GoalSource,
    pub source_trust: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum GoalError {
    #[error("Agent-sourced goal requires source trust >= {floor}, got {got:.2}")]
    BelowTrustFloor { floor: f64, got: f64 },

    #[error("Parent goal '{0}' does not exist")]
    ParentNotFound(GoalId),

    #[error("Goal '{0}' not found")]
    NotFound(GoalId),

    #[error("Goal description cannot be empty")]
    EmptyDescription,
}

impl Goal {
    /// Build a goal from a draft. The parent-existence check lives in the
    /// goal manager, which owns the tree.
    pub fn from_draft(draft: GoalDraft) -> Result<Self, GoalError> {
        if draft.description.trim().is_empty() {
            return Err(GoalError::EmptyDescription);
        }
        if draft.source == GoalSource::Agent && draft.source_trust < AGENT_GOAL_TRUST_FLOOR {
            return Err(GoalError::BelowTrustFloor {
                floor: AGENT_GOAL_TRUST_FLOOR,
                got: draft.source_trust,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: GoalId::new(),
            description: draft.description,
            priority: draft.priority,
            status: GoalStatus::Active,
            parent_goal_id: draft.parent_goal_id,
            success_criteria: draft.success_criteria,
            source: draft.source,
            source_trust: draft.source_trust,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(source: GoalSource, trust: f64) -> GoalDraft {
        GoalDraft {
            description: "ship the release".to_string(),
            priority: 1,
            parent_goal_id: None,
            success_criteria: vec!["tests pass".to_string()],
            source,
            source_trust: trust,
        }
    }

    #[test]
    fn agent_goal_below_floor_fails() {
        let result = Goal::from_draft(draft(GoalSource::Agent, 0.3));
        assert!(matches!(result, Err(GoalError::BelowTrustFloor { .. })));
    }

    #[test]
    fn agent_goal_at_floor_succeeds() {
        let goal = Goal::from_draft(draft(GoalSource::Agent, 0.6)).unwrap();
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[test]
    fn user_goal_ignores_floor() {
        assert!(Goal::from_draft(draft(GoalSource::User, 0.0)).is_ok());
    }

    #[test]
    fn empty_description_rejected() {
        let mut d = draft(GoalSource::User, 1.0);
        d.description = "  ".to_string();
        assert!(matches!(Goal::from_draft(d), Err(GoalError::EmptyDescription)));
    }
}
