// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Contracts
//!
//! Persistence boundaries for kernel state snapshots, identity versions, and
//! the hash-chained event log. Infrastructure provides in-memory reference
//! implementations and PostgreSQL-backed ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::events::{EventRecord, NewEvent};
use crate::domain::identity::{IdentityConfig, IdentityVersion};
use crate::domain::state::StateSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// A snapshot as persisted, with the store-assigned row id used for
/// deterministic "latest" resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub id: i64,
    pub agent_id: String,
    pub snapshot: StateSnapshot,
}

/// Outcome of a snapshot write: stale writes are skipped, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotWriteOutcome {
    Persisted,
    SkippedStale,
}

/// Durable store for kernel state snapshots (`autonomy_state`).
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Persist a snapshot unless one with a newer `snapshot_at` already
    /// exists for the agent (the stale-write guard).
    async fn save(
        &self,
        agent_id: &str,
        snapshot: &StateSnapshot,
    ) -> Result<SnapshotWriteOutcome, RepositoryError>;

    /// The latest snapshot, ordered by `snapshot_at DESC, id DESC` (not
    /// insertion order) to tolerate out-of-order commits.
    async fn latest(&self, agent_id: &str) -> Result<Option<PersistedSnapshot>, RepositoryError>;
}

/// Append-only identity version store (`autonomy_identity`).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Append a new version and make it the single active one for the agent.
    async fn put_version(
        &self,
        identity: &IdentityConfig,
    ) -> Result<IdentityVersion, RepositoryError>;

    async fn active(&self, agent_id: &str) -> Result<Option<IdentityVersion>, RepositoryError>;

    async fn history(&self, agent_id: &str) -> Result<Vec<IdentityVersion>, RepositoryError>;
}

/// Append-only, hash-chained event log (`autonomy_events`).
///
/// No component truncates or edits past entries; the retention sweep is the
/// only sanctioned eviction path.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, computing its chain hash at write time from the
    /// previous event of the same agent lineage. Returns the sequence id.
    async fn append(&self, event: NewEvent) -> Result<i64, RepositoryError>;

    /// All events for an agent, ordered by sequence id ascending.
    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<EventRecord>, RepositoryError>;

    /// Events for a correlation id (request lineage), ordered by sequence id.
    async fn events_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<EventRecord>, RepositoryError>;

    /// Recompute and verify the full chain for an agent.
    async fn verify(&self, agent_id: &str) -> Result<(), RepositoryError>;

    /// Migration/backfill: recompute chains for rows written before hashing
    /// existed, grouped by agent, ordered by row id. Returns rows updated.
    async fn backfill(&self) -> Result<u64, RepositoryError>;
}
