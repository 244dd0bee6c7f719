// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Repository Implementations
//!
//! Reference implementations used by tests and embedded deployments. They
//! honor the same contracts as the PostgreSQL repositories, including the
//! stale-snapshot guard and deterministic latest-row resolution.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use crate::domain::identity::{IdentityConfig, IdentityVersion};
use crate::domain::repository::{
    IdentityStore, PersistedSnapshot, RepositoryError, SnapshotRepository, SnapshotWriteOutcome,
};
use crate::domain::state::StateSnapshot;

pub struct InMemorySnapshotRepository {
    rows: Mutex<Vec<PersistedSnapshot>>,
    next_id: Mutex<i64>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Test hook: raw insert bypassing the stale guard, for simulating
    /// out-of-order arrival from a second writer.
    pub fn insert_raw(&self, agent_id: &str, snapshot: StateSnapshot) -> i64 {
        let mut next_id = self.next_id.lock();
        let id = *next_id;
        *next_id += 1;
        self.rows.lock().push(PersistedSnapshot {
            id,
            agent_id: agent_id.to_string(),
            snapshot,
        });
        id
    }

    fn latest_row(&self, agent_id: &str) -> Option<PersistedSnapshot> {
        // Ordered by snapshot_at then row id, not just insertion order.
        self.rows
            .lock()
            .iter()
            .filter(|row| row.agent_id == agent_id)
            .max_by(|a, b| {
                a.snapshot
                    .snapshot_at
                    .cmp(&b.snapshot.snapshot_at)
                    .then(a.id.cmp(&b.id))
            })
            .cloned()
    }
}

impl Default for InMemorySnapshotRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn save(
        &self,
        agent_id: &str,
        snapshot: &StateSnapshot,
    ) -> Result<SnapshotWriteOutcome, RepositoryError> {
        if let Some(latest) = self.latest_row(agent_id) {
            if latest.snapshot.snapshot_at > snapshot.snapshot_at {
                warn!(
                    agent_id,
                    incoming = %snapshot.snapshot_at,
                    persisted = %latest.snapshot.snapshot_at,
                    "Skipping stale snapshot write"
                );
                metrics::counter!(crate::telemetry::STALE_SNAPSHOT_SKIPPED_TOTAL).increment(1);
                return Ok(SnapshotWriteOutcome::SkippedStale);
            }
        }
        self.insert_raw(agent_id, snapshot.clone());
        Ok(SnapshotWriteOutcome::Persisted)
    }

    async fn latest(&self, agent_id: &str) -> Result<Option<PersistedSnapshot>, RepositoryError> {
        Ok(self.latest_row(agent_id))
    }
}

pub struct InMemoryIdentityStore {
    versions: Mutex<Vec<IdentityVersion>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            versions: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for tests: seed an active identity, ignoring errors.
    pub async fn seed(&self, identity: IdentityConfig) {
        let _ = self.put_version(&identity).await;
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn put_version(
        &self,
        identity: &IdentityConfig,
    ) -> Result<IdentityVersion, RepositoryError> {
        let mut versions = self.versions.lock();
        let next_version = versions
            .iter()
            .filter(|v| v.agent_id == identity.agent_id)
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;

        // Exactly one active row per agent: deactivate the previous one in
        // the same critical section.
        for version in versions
            .iter_mut()
            .filter(|v| v.agent_id == identity.agent_id)
        {
            version.active = false;
        }

        let row = IdentityVersion {
            version: next_version,
            identity: identity.clone(),
            hash: identity.content_hash(),
            agent_id: identity.agent_id.clone(),
            active: true,
            created_at: Utc::now(),
        };
        versions.push(row.clone());
        Ok(row)
    }

    async fn active(&self, agent_id: &str) -> Result<Option<IdentityVersion>, RepositoryError> {
        Ok(self
            .versions
            .lock()
            .iter()
            .find(|v| v.agent_id == agent_id && v.active)
            .cloned())
    }

    async fn history(&self, agent_id: &str) -> Result<Vec<IdentityVersion>, RepositoryError> {
        let mut rows: Vec<IdentityVersion> = self
            .versions
            .lock()
            .iter()
            .filter(|v| v.agent_id == agent_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.version);
        Ok(rows)
    }
}
