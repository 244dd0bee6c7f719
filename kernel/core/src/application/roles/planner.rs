// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Planner Role
//!
//! Builds an execution plan from a request: registers the request's goals
//! through the trust-gated goal manager and assembles the validated step
//! graph. The boundary exists so a remote planner can replace this adapter
//! without touching the orchestrator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::application::goal_manager::GoalManager;
use crate::application::orchestrator::KernelRequest;
use crate::application::roles::{PlannerRole, RoleError};
use crate::application::trust::SourceTracker;
use crate::domain::goal::{GoalDraft, GoalSource};
use crate::domain::plan::{ExecutionPlan, PlanId, PlanStatus};
use crate::domain::trust::SourceType;

pub struct InProcessPlanner {
    goal_manager: Arc<GoalManager>,
    tracker: Arc<SourceTracker>,
    active_plan: Mutex<Option<ExecutionPlan>>,
}

impl InProcessPlanner {
    pub fn new(goal_manager: Arc<GoalManager>, tracker: Arc<SourceTracker>) -> Self {
        Self {
            goal_manager,
            tracker,
            active_plan: Mutex::new(None),
        }
    }

    fn goal_source_for(source_type: SourceType) -> GoalSource {
        match source_type {
            SourceType::User => GoalSource::User,
            SourceType::System => GoalSource::System,
            SourceType::Agent | SourceType::External => GoalSource::Agent,
        }
    }
}

#[async_trait]
impl PlannerRole for InProcessPlanner {
    async fn create_plan(&self, request: &KernelRequest) -> Result<ExecutionPlan, RoleError> {
        let effective_trust = self
            .tracker
            .effective_reliability(&request.source.as_trust_source());
        let goal_source = Self::goal_source_for(request.source.source_type);

        let mut goal_ids = Vec::with_capacity(request.goals.len());
        for spec in &request.goals {
            let goal = self
                .goal_manager
                .add_goal(GoalDraft {
                    description: spec.description.clone(),
                    priority: spec.priority,
                    parent_goal_id: None,
                    success_criteria: spec.success_criteria.clone(),
                    source: goal_source,
                    source_trust: effective_trust,
                })
                .map_err(|e| RoleError::Planning(e.to_string()))?;
            goal_ids.push(goal.id);
        }

        let mut plan = ExecutionPlan::new(goal_ids, request.steps.clone())
            .map_err(|e| RoleError::Planning(e.to_string()))?;
        plan.status = PlanStatus::Approved;

        info!(
            request_id = %request.request_id,
            plan_id = %plan.id,
            steps = plan.steps.len(),
            "Plan created"
        );
        *self.active_plan.lock() = Some(plan.clone());
        Ok(plan)
    }

    async fn validate_plan(&self, plan: &ExecutionPlan) -> Result<(), RoleError> {
        if plan.steps.is_empty() {
            return Err(RoleError::Planning("plan has no steps".to_string()));
        }
        if plan.status == PlanStatus::Rejected {
            return Err(RoleError::Planning("plan was rejected".to_string()));
        }
        Ok(())
    }

    async fn get_active_plan(&self) -> Option<ExecutionPlan> {
        self.active_plan.lock().clone()
    }

    async fn cancel_plan(&self, plan_id: PlanId) -> bool {
        let mut active = self.active_plan.lock();
        match active.as_mut() {
            Some(plan) if plan.id == plan_id => {
                plan.status = PlanStatus::Cancelled;
                true
            }
            _ => false,
        }
    }
}
