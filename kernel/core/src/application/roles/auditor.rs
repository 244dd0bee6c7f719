// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Auditor Role
//!
//! Thin pass-through over the audit service: computes drift and anomalies
//! from the event-store trail and re-verifies the agent's hash chain.

use async_trait::async_trait;
use std::sync::Arc;

use crate::application::audit::{AuditReport, AuditService};
use crate::application::orchestrator::KernelRequest;
use crate::application::roles::{AuditorRole, RoleError};

pub struct InProcessAuditor {
    service: Arc<AuditService>,
}

impl InProcessAuditor {
    pub fn new(service: Arc<AuditService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AuditorRole for InProcessAuditor {
    async fn audit(&self, request: &KernelRequest) -> Result<AuditReport, RoleError> {
        self.service
            .audit(&request.agent_id, &request.request_id)
            .await
            .map_err(|e| RoleError::Audit(e.to_string()))
    }
}
