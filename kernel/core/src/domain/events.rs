// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pipeline Events and the Hash Chain
//!
//! Two event families live here:
//!
//! - [`EventRecord`]: the persisted, tamper-evident audit record. Each
//!   record's hash incorporates the previous record's hash for the same
//!   agent lineage, so retroactive tampering invalidates every descendant.
//! - [`PipelineEvent`]: transient pub/sub notifications for observers
//!   (stage changes, gate decisions, safe-mode activity).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::memory::GateAction;
use crate::domain::state::{KernelState, StateTrigger};

/// A persisted, hash-chained pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence_id: i64,
    pub request_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
    pub agent_id: String,
    /// Absent for the first event of an agent's chain.
    pub prev_hash: Option<String>,
    pub event_hash: String,
}

/// Append input: everything but the store-assigned sequence id and the
/// chain hashes, which are computed at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub request_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: Option<String>,
    pub agent_id: String,
}

impl NewEvent {
    pub fn new(
        agent_id: impl Into<String>,
        request_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let request_id = request_id.into();
        Self {
            correlation_id: Some(request_id.clone()),
            request_id,
            event_type: event_type.into(),
            payload,
            agent_id: agent_id.into(),
        }
    }
}

/// Recursively sort object keys so the hashed payload representation is
/// independent of serialization order.
pub fn normalize_payload(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).unwrap_or_default());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Chain hash over the event's semantic fields plus the previous hash.
///
/// The hash never includes itself or the sequence id; recomputing it from a
/// stored row must reproduce `event_hash` exactly.
pub fn compute_event_hash(
    request_id: &str,
    event_type: &str,
    payload: &serde_json::Value,
    timestamp: DateTime<Utc>,
    prev_hash: Option<&str>,
    correlation_id: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(event_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_payload(payload).as_bytes());
    hasher.update([0u8]);
    hasher.update(
        timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    hasher.update([0u8]);
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(correlation_id.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

impl EventRecord {
    /// Recompute this record's hash from its stored fields.
    pub fn recompute_hash(&self) -> String {
        compute_event_hash(
            &self.request_id,
            &self.event_type,
            &self.payload,
            self.timestamp,
            self.prev_hash.as_deref(),
            self.correlation_id.as_deref(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventChainError {
    #[error("Hash mismatch at sequence {sequence_id}: chain is tampered or corrupt at or before this row")]
    HashMismatch { sequence_id: i64 },

    #[error("Broken linkage at sequence {sequence_id}: prev_hash does not match the preceding event")]
    BrokenLink { sequence_id: i64 },

    #[error("First event of agent '{agent_id}' carries a prev_hash")]
    UnexpectedPrevHash { agent_id: String },
}

/// Verify a single agent's chain, ordered by sequence id ascending.
pub fn verify_chain(records: &[EventRecord]) -> Result<(), EventChainError> {
    let mut prev: Option<&str> = None;
    for (index, record) in records.iter().enumerate() {
        if index == 0 && record.prev_hash.is_some() {
            return Err(EventChainError::UnexpectedPrevHash {
                agent_id: record.agent_id.clone(),
            });
        }
        if record.prev_hash.as_deref() != prev {
            return Err(EventChainError::BrokenLink {
                sequence_id: record.sequence_id,
            });
        }
        if record.recompute_hash() != record.event_hash {
            return Err(EventChainError::HashMismatch {
                sequence_id: record.sequence_id,
            });
        }
        prev = Some(record.event_hash.as_str());
    }
    Ok(())
}

// ── Transient pub/sub events ────────────────────────────────────────────────

/// Pipeline notifications published on the event bus for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StageEntered {
        request_id: String,
        from: KernelState,
        to: KernelState,
        trigger: StateTrigger,
        at: DateTime<Utc>,
    },
    StageFailed {
        request_id: String,
        stage: KernelState,
        reason: String,
        consecutive_errors: u32,
        at: DateTime<Utc>,
    },
    SafeModeEntered {
        reason: String,
        consecutive_errors: u32,
        at: DateTime<Utc>,
    },
    SafeModeExitDenied {
        approver: String,
        reason: String,
        at: DateTime<Utc>,
    },
    SafeModeExited {
        approver: String,
        at: DateTime<Utc>,
    },
    MemoryGated {
        request_id: String,
        action: GateAction,
        reason: String,
        at: DateTime<Utc>,
    },
    WorkflowDeadLettered {
        workflow_id: String,
        execution_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        agent: &str,
        seq: i64,
        payload: serde_json::Value,
        prev: Option<String>,
    ) -> EventRecord {
        let timestamp = Utc::now();
        let hash = compute_event_hash(
            "req-1",
            "step_executed",
            &payload,
            timestamp,
            prev.as_deref(),
            Some("req-1"),
        );
        EventRecord {
            sequence_id: seq,
            request_id: "req-1".to_string(),
            event_type: "step_executed".to_string(),
            payload,
            timestamp,
            correlation_id: Some("req-1".to_string()),
            agent_id: agent.to_string(),
            prev_hash: prev,
            event_hash: hash,
        }
    }

    #[test]
    fn normalization_is_key_order_independent() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert_eq!(normalize_payload(&a), normalize_payload(&b));
        assert_eq!(normalize_payload(&a), r#"{"a":{"x":3,"y":2},"b":1}"#);
    }

    #[test]
    fn valid_chain_verifies() {
        let first = record("agent-1", 1, serde_json::json!({"n": 1}), None);
        let second = record(
            "agent-1",
            2,
            serde_json::json!({"n": 2}),
            Some(first.event_hash.clone()),
        );
        assert!(verify_chain(&[first, second]).is_ok());
    }

    #[test]
    fn payload_mutation_invalidates_event_and_descendants() {
        let first = record("agent-1", 1, serde_json::json!({"n": 1}), None);
        let mut second = record(
            "agent-1",
            2,
            serde_json::json!({"n": 2}),
            Some(first.event_hash.clone()),
        );
        let third = record(
            "agent-1",
            3,
            serde_json::json!({"n": 3}),
            Some(second.event_hash.clone()),
        );

        // Tamper with the middle event's payload.
        second.payload = serde_json::json!({"n": 99});

        let err = verify_chain(&[first, second, third]).unwrap_err();
        assert!(matches!(err, EventChainError::HashMismatch { sequence_id: 2 }));
    }

    #[test]
    fn first_event_must_have_no_prev_hash() {
        let bogus = record("agent-1", 1, serde_json::json!({}), Some("deadbeef".to_string()));
        let err = verify_chain(&[bogus]).unwrap_err();
        assert!(matches!(err, EventChainError::UnexpectedPrevHash { .. }));
    }

    #[test]
    fn broken_linkage_detected() {
        let first = record("agent-1", 1, serde_json::json!({"n": 1}), None);
        let second = record("agent-1", 2, serde_json::json!({"n": 2}), Some("wrong".to_string()));
        let err = verify_chain(&[first, second]).unwrap_err();
        assert!(matches!(err, EventChainError::BrokenLink { sequence_id: 2 }));
    }
}
