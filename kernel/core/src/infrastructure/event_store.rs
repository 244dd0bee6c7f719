// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Event Store
//!
//! Reference implementation of the append-only, hash-chained event log.
//! Chains are per-agent: each append computes its hash from the event's
//! semantic fields plus the previous event's hash for the same agent,
//! ordered by monotonic sequence id. The PostgreSQL implementation lives in
//! `infrastructure::repositories::postgres_events`.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::events::{compute_event_hash, verify_chain, EventRecord, NewEvent};
use crate::domain::repository::{EventStore, RepositoryError};

struct StoreInner {
    records: Vec<EventRecord>,
    next_sequence_id: i64,
    // Terminal hash per agent lineage, avoiding a scan per append.
    chain_heads: HashMap<String, String>,
}

pub struct InMemoryEventStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                records: Vec::new(),
                next_sequence_id: 1,
                chain_heads: HashMap::new(),
            }),
        }
    }

    /// Test/migration hook: insert a raw record without chain hashing, as a
    /// pre-migration row would look. `backfill` repairs these.
    pub fn insert_unchained(&self, mut record: EventRecord) -> i64 {
        let mut inner = self.inner.lock();
        record.sequence_id = inner.next_sequence_id;
        inner.next_sequence_id += 1;
        record.prev_hash = None;
        record.event_hash = String::new();
        let id = record.sequence_id;
        inner.records.push(record);
        id
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<i64, RepositoryError> {
        let mut inner = self.inner.lock();
        let sequence_id = inner.next_sequence_id;
        inner.next_sequence_id += 1;

        let timestamp = Utc::now();
        let prev_hash = inner.chain_heads.get(&event.agent_id).cloned();
        let event_hash = compute_event_hash(
            &event.request_id,
            &event.event_type,
            &event.payload,
            timestamp,
            prev_hash.as_deref(),
            event.correlation_id.as_deref(),
        );

        inner
            .chain_heads
            .insert(event.agent_id.clone(), event_hash.clone());
        inner.records.push(EventRecord {
            sequence_id,
            request_id: event.request_id,
            event_type: event.event_type,
            payload: event.payload,
            timestamp,
            correlation_id: event.correlation_id,
            agent_id: event.agent_id,
            prev_hash,
            event_hash,
        });

        debug!(sequence_id, "Event appended");
        Ok(sequence_id)
    }

    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<EventRecord>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn events_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<EventRecord>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .filter(|r| r.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect())
    }

    async fn verify(&self, agent_id: &str) -> Result<(), RepositoryError> {
        let records = self.events_for_agent(agent_id).await?;
        verify_chain(&records).map_err(|e| RepositoryError::Database(e.to_string()))
    }

    async fn backfill(&self) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.lock();

        // Group unmigrated rows by agent, preserving row-id order within
        // each group; each agent's first row gets no previous hash.
        let mut agents: Vec<String> = Vec::new();
        for record in &inner.records {
            if !agents.contains(&record.agent_id) {
                agents.push(record.agent_id.clone());
            }
        }

        let mut updated = 0u64;
        for agent in agents {
            let mut prev: Option<String> = None;
            for record in inner.records.iter_mut().filter(|r| r.agent_id == agent) {
                let expected = compute_event_hash(
                    &record.request_id,
                    &record.event_type,
                    &record.payload,
                    record.timestamp,
                    prev.as_deref(),
                    record.correlation_id.as_deref(),
                );
                if record.event_hash != expected || record.prev_hash != prev {
                    record.prev_hash = prev.clone();
                    record.event_hash = expected.clone();
                    updated += 1;
                }
                prev = Some(record.event_hash.clone());
            }
            if let Some(head) = prev {
                inner.chain_heads.insert(agent, head);
            }
        }

        info!(updated, "Event chain backfill complete");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(agent: &str, request: &str, payload: serde_json::Value) -> NewEvent {
        NewEvent::new(agent, request, "step_executed", payload)
    }

    #[tokio::test]
    async fn chains_are_per_agent() {
        let store = InMemoryEventStore::new();
        store
            .append(event("agent-a", "req-1", serde_json::json!({"n": 1})))
            .await
            .unwrap();
        store
            .append(event("agent-b", "req-2", serde_json::json!({"n": 2})))
            .await
            .unwrap();
        store
            .append(event("agent-a", "req-1", serde_json::json!({"n": 3})))
            .await
            .unwrap();

        let a = store.events_for_agent("agent-a").await.unwrap();
        let b = store.events_for_agent("agent-b").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);

        // Each agent's first event has no prev_hash; a's second links to
        // a's first, not b's event.
        assert!(a[0].prev_hash.is_none());
        assert!(b[0].prev_hash.is_none());
        assert_eq!(a[1].prev_hash.as_deref(), Some(a[0].event_hash.as_str()));

        store.verify("agent-a").await.unwrap();
        store.verify("agent-b").await.unwrap();
    }

    #[tokio::test]
    async fn sequence_ids_are_monotonic() {
        let store = InMemoryEventStore::new();
        let first = store
            .append(event("agent-a", "req-1", serde_json::json!({})))
            .await
            .unwrap();
        let second = store
            .append(event("agent-a", "req-1", serde_json::json!({})))
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn backfill_recomputes_unmigrated_rows() {
        let store = InMemoryEventStore::new();
        for n in 0..3 {
            store.insert_unchained(EventRecord {
                sequence_id: 0,
                request_id: "req-legacy".to_string(),
                event_type: "step_executed".to_string(),
                payload: serde_json::json!({"n": n}),
                timestamp: Utc::now(),
                correlation_id: Some("req-legacy".to_string()),
                agent_id: "agent-a".to_string(),
                prev_hash: None,
                event_hash: String::new(),
            });
        }

        // Unmigrated rows fail verification.
        assert!(store.verify("agent-a").await.is_err());

        let updated = store.backfill().await.unwrap();
        assert_eq!(updated, 3);
        store.verify("agent-a").await.unwrap();

        // Appends after backfill extend the repaired chain.
        store
            .append(event("agent-a", "req-new", serde_json::json!({})))
            .await
            .unwrap();
        store.verify("agent-a").await.unwrap();

        // Idempotent: a second backfill touches nothing.
        assert_eq!(store.backfill().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn correlation_lookup_spans_agents() {
        let store = InMemoryEventStore::new();
        store
            .append(event("agent-a", "req-1", serde_json::json!({})))
            .await
            .unwrap();
        store
            .append(event("agent-a", "req-2", serde_json::json!({})))
            .await
            .unwrap();

        let trail = store.events_for_correlation("req-1").await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].request_id, "req-1");
    }
}
