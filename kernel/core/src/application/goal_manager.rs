// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Goal Manager Application Service
//!
//! Hierarchical goal CRUD with trust-gated creation and rule-based
//! completion evaluation. The manager owns the goal tree: a parent must
//! already exist when a child is created, which rules out cycles by
//! construction order.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use crate::domain::goal::{Goal, GoalDraft, GoalError, GoalId, GoalStatus};

pub struct GoalManager {
    goals: RwLock<HashMap<GoalId, Goal>>,
}

impl GoalManager {
    pub fn new() -> Self {
        Self {
            goals: RwLock::new(HashMap::new()),
        }
    }

    /// Create a goal from a draft. Trust-floor violations and missing
    /// parents are rejected outright, not queued.
    pub fn add_goal(&self, draft: GoalDraft) -> Result<Goal, GoalError> {
        if let Some(parent_id) = draft.parent_goal_id {
            if !self.goals.read().contains_key(&parent_id) {
                return Err(GoalError::ParentNotFound(parent_id));
            }
        }

        let goal = Goal::from_draft(draft)?;
        info!(goal_id = %goal.id, source = ?goal.source, "Goal created");
        self.goals.write().insert(goal.id, goal.clone());
        Ok(goal)
    }

    pub fn get(&self, id: GoalId) -> Option<Goal> {
        self.goals.read().get(&id).cloned()
    }

    pub fn children_of(&self, parent: GoalId) -> Vec<Goal> {
        self.goals
            .read()
            .values()
            .filter(|g| g.parent_goal_id == Some(parent))
            .cloned()
            .collect()
    }

    pub fn active_goals(&self) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self
            .goals
            .read()
            .values()
            .filter(|g| g.status == GoalStatus::Active)
            .cloned()
            .collect();
        goals.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        goals
    }

    pub fn set_status(&self, id: GoalId, status: GoalStatus) -> Result<Goal, GoalError> {
        let mut goals = self.goals.write();
        let goal = goals.get_mut(&id).ok_or(GoalError::NotFound(id))?;
        goal.status = status;
        goal.updated_at = chrono::Utc::now();
        Ok(goal.clone())
    }

    /// Rule-based completion: a goal completes when every success criterion
    /// is marked satisfied in the evidence map. Returns the updated status.
    pub fn evaluate_completion(
        &self,
        id: GoalId,
        evidence: &HashMap<String, bool>,
    ) -> Result<GoalStatus, GoalError> {
        let mut goals = self.goals.write();
        let goal = goals.get_mut(&id).ok_or(GoalError::NotFound(id))?;

        if goal.status != GoalStatus::Active {
            return Ok(goal.status);
        }

        let all_satisfied = !goal.success_criteria.is_empty()
            && goal
                .success_criteria
                .iter()
                .all(|criterion| evidence.get(criterion).copied().unwrap_or(false));

        if all_satisfied {
            goal.status = GoalStatus::Completed;
            goal.updated_at = chrono::Utc::now();
            info!(goal_id = %goal.id, "Goal completed");
        }
        Ok(goal.status)
    }

    pub fn remove(&self, id: GoalId) -> Option<Goal> {
        self.goals.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.goals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.read().is_empty()
    }
}

impl Default for GoalManager {
    fn default() -> Self {
        Self::new()
    }
}
