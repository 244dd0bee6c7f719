// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit Application Service
//!
//! Computes drift and anomalies from the event-store trail for a request.
//! Drift is the deviation of observed agent output from the active identity
//! baseline; anomalies are rule-based findings over the recorded pipeline
//! events. The audit also re-verifies the agent's hash chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::events::EventRecord;
use crate::domain::identity::IdentityConfig;
use crate::domain::repository::{EventStore, IdentityStore, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    RepeatedFailures,
    MemoryRejectionSpike,
    UnknownEventType,
    VerificationDegraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub request_id: String,
    pub agent_id: String,
    /// 0 = output matches the identity baseline, 1 = full deviation.
    pub drift_score: f64,
    pub anomalies: Vec<Anomaly>,
    pub event_count: usize,
    pub chain_verified: bool,
    pub computed_at: DateTime<Utc>,
}

const KNOWN_EVENT_TYPES: [&str; 6] = [
    "plan_created",
    "step_executed",
    "verification_completed",
    "memory_gated",
    "audit_completed",
    "stage_failed",
];

pub struct AuditService {
    events: Arc<dyn EventStore>,
    identities: Arc<dyn IdentityStore>,
}

impl AuditService {
    pub fn new(events: Arc<dyn EventStore>, identities: Arc<dyn IdentityStore>) -> Self {
        Self { events, identities }
    }

    pub async fn audit(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Result<AuditReport, RepositoryError> {
        let chain_verified = self.events.verify(agent_id).await.is_ok();
        let trail = self.events.events_for_correlation(request_id).await?;
        let identity = self
            .identities
            .active(agent_id)
            .await?
            .map(|version| version.identity);

        let drift_score = Self::drift(&trail, identity.as_ref());
        let anomalies = Self::anomalies(&trail);

        debug!(
            agent_id,
            request_id,
            drift_score,
            anomalies = anomalies.len(),
            "Audit computed"
        );

        Ok(AuditReport {
            request_id: request_id.to_string(),
            agent_id: agent_id.to_string(),
            drift_score,
            anomalies,
            event_count: trail.len(),
            chain_verified,
            computed_at: Utc::now(),
        })
    }

    /// Fraction of textual step outputs that carry none of the identity's
    /// persona markers. No baseline configured means no measurable drift.
    fn drift(trail: &[EventRecord], identity: Option<&IdentityConfig>) -> f64 {
        let Some(identity) = identity else {
            return 0.0;
        };
        if identity.persona_baseline.is_empty() {
            return 0.0;
        }

        let outputs: Vec<String> = trail
            .iter()
            .filter(|e| e.event_type == "step_executed")
            .filter_map(|e| serde_json::to_string(&e.payload).ok())
            .collect();
        if outputs.is_empty() {
            return 0.0;
        }

        let off_baseline = outputs
            .iter()
            .filter(|output| {
                let lowered = output.to_lowercase();
                !identity
                    .persona_baseline
                    .iter()
                    .any(|marker| lowered.contains(&marker.to_lowercase()))
            })
            .count();
        off_baseline as f64 / outputs.len() as f64
    }

    fn anomalies(trail: &[EventRecord]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        let failures = trail
            .iter()
            .filter(|e| e.event_type == "stage_failed")
            .count();
        if failures >= 2 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::RepeatedFailures,
                detail: format!("{} stage failures in one request trail", failures),
            });
        }

        let gated: Vec<&EventRecord> = trail
            .iter()
            .filter(|e| e.event_type == "memory_gated")
            .collect();
        let rejects = gated
            .iter()
            .filter(|e| e.payload.get("action").and_then(|a| a.as_str()) == Some("reject"))
            .count();
        if !gated.is_empty() && rejects * 2 > gated.len() {
            anomalies.push(Anomaly {
                kind: AnomalyKind::MemoryRejectionSpike,
                detail: format!("{}/{} memory candidates rejected", rejects, gated.len()),
            });
        }

        for event in trail {
            if !KNOWN_EVENT_TYPES.contains(&event.event_type.as_str()) {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::UnknownEventType,
                    detail: format!("unexpected event type '{}'", event.event_type),
                });
            }
        }

        let degraded = trail.iter().any(|e| {
            e.event_type == "verification_completed"
                && e.payload.get("overall_passed").and_then(|v| v.as_bool()) == Some(false)
        });
        if degraded {
            anomalies.push(Anomaly {
                kind: AnomalyKind::VerificationDegraded,
                detail: "verification did not fully pass".to_string(),
            });
        }

        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::IdentityConfig;
    use crate::infrastructure::event_store::InMemoryEventStore;
    use crate::infrastructure::repositories::memory::InMemoryIdentityStore;
    use crate::domain::events::NewEvent;

    async fn seeded_service() -> (AuditService, Arc<InMemoryEventStore>) {
        let events = Arc::new(InMemoryEventStore::new());
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities
            .seed(IdentityConfig {
                agent_id: "agent-1".to_string(),
                core_values: vec!["honesty".to_string()],
                persona_baseline: vec!["deploy".to_string()],
            })
            .await;
        (
            AuditService::new(events.clone(), identities),
            events,
        )
    }

    #[tokio::test]
    async fn clean_trail_yields_no_anomalies() {
        let (service, events) = seeded_service().await;
        events
            .append(NewEvent::new(
                "agent-1",
                "req-1",
                "step_executed",
                serde_json::json!({"tool": "deploy", "success": true}),
            ))
            .await
            .unwrap();

        let report = service.audit("agent-1", "req-1").await.unwrap();
        assert!(report.chain_verified);
        assert!(report.anomalies.is_empty());
        assert_eq!(report.event_count, 1);
        assert_eq!(report.drift_score, 0.0);
    }

    #[tokio::test]
    async fn off_baseline_output_raises_drift() {
        let (service, events) = seeded_service().await;
        events
            .append(NewEvent::new(
                "agent-1",
                "req-1",
                "step_executed",
                serde_json::json!({"tool": "unrelated", "output": "nothing relevant"}),
            ))
            .await
            .unwrap();

        let report = service.audit("agent-1", "req-1").await.unwrap();
        assert_eq!(report.drift_score, 1.0);
    }

    #[tokio::test]
    async fn repeated_failures_flagged() {
        let (service, events) = seeded_service().await;
        for _ in 0..2 {
            events
                .append(NewEvent::new(
                    "agent-1",
                    "req-1",
                    "stage_failed",
                    serde_json::json!({"stage": "executing"}),
                ))
                .await
                .unwrap();
        }

        let report = service.audit("agent-1", "req-1").await.unwrap();
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::RepeatedFailures));
    }
}
