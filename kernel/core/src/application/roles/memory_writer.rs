// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory-Writer Role
//!
//! Gates every candidate memory write in a request through the memory gate,
//! persists the allowed ones into the agent's entity-scoped memory, and
//! feeds the source tracker. Quarantined candidates are retained nowhere;
//! their decision record is the pipeline's only trace.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::memory_gate::MemoryGate;
use crate::application::orchestrator::KernelRequest;
use crate::application::roles::{MemoryWriterRole, RoleError};
use crate::application::trust::{SourceTracker, TrustScorer};
use crate::domain::memory::{GateAction, MemoryGateDecision, MemorySourceProfile, MemoryTier};
use crate::infrastructure::entity_memory::EntityMemoryStore;

pub struct InProcessMemoryWriter {
    gate: Arc<MemoryGate>,
    tracker: Arc<SourceTracker>,
    scorer: TrustScorer,
    store: Arc<dyn EntityMemoryStore>,
}

impl InProcessMemoryWriter {
    pub fn new(
        gate: Arc<MemoryGate>,
        tracker: Arc<SourceTracker>,
        scorer: TrustScorer,
        store: Arc<dyn EntityMemoryStore>,
    ) -> Self {
        Self {
            gate,
            tracker,
            scorer,
            store,
        }
    }
}

#[async_trait]
impl MemoryWriterRole for InProcessMemoryWriter {
    async fn write(
        &self,
        request: &KernelRequest,
    ) -> Result<Vec<MemoryGateDecision>, RoleError> {
        if request.memory_candidates.is_empty() {
            return Ok(Vec::new());
        }

        let reliability = self
            .tracker
            .effective_reliability(&request.source.as_trust_source());
        let trust = self.scorer.score(reliability, &request.source.content_signals);

        let profile = MemorySourceProfile {
            source_id: request.source.id.clone(),
            verified: request.source.verified,
            age_days: request.source.age_days,
            prior_interactions: self.tracker.interactions(&request.source.id),
        };

        let entity = self
            .store
            .canonical_entity(&request.agent_id, &request.agent_id, "agent")
            .await
            .map_err(|e| RoleError::MemoryWrite(e.to_string()))?;

        let mut decisions = Vec::with_capacity(request.memory_candidates.len());
        for candidate in &request.memory_candidates {
            let decision = self.gate.evaluate(trust.score, candidate, &profile);
            debug!(
                request_id = %request.request_id,
                action = %decision.action,
                "Memory candidate gated"
            );

            if decision.action == GateAction::Allow {
                self.store
                    .remember(entity.id, MemoryTier::MidTerm, &candidate.content)
                    .await
                    .map_err(|e| RoleError::MemoryWrite(e.to_string()))?;
            }
            decisions.push(decision);
        }

        Ok(decisions)
    }
}
