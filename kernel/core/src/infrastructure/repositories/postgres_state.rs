// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL Snapshot Repository
//!
//! Persists kernel state snapshots to `autonomy_state`. The latest row per
//! agent is resolved by `ORDER BY snapshot_at DESC, id DESC LIMIT 1`, and a
//! write older than the persisted latest is skipped: the second line of
//! defense behind the single-writer queue, covering concurrent kernel
//! instances for the same agent.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE autonomy_state (
//!     id                 BIGSERIAL PRIMARY KEY,
//!     agent_id           TEXT NOT NULL,
//!     state              TEXT NOT NULL,
//!     consecutive_errors INTEGER NOT NULL DEFAULT 0,
//!     snapshot_at        TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX idx_autonomy_state_latest
//!     ON autonomy_state (agent_id, snapshot_at DESC, id DESC);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::warn;

use crate::domain::repository::{
    PersistedSnapshot, RepositoryError, SnapshotRepository, SnapshotWriteOutcome,
};
use crate::domain::state::{KernelState, StateSnapshot};

pub struct PgSnapshotRepository {
    pool: PgPool,
}

impl PgSnapshotRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    async fn save(
        &self,
        agent_id: &str,
        snapshot: &StateSnapshot,
    ) -> Result<SnapshotWriteOutcome, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let latest: Option<DateTime<Utc>> = sqlx::query(
            r#"
            SELECT snapshot_at
            FROM autonomy_state
            WHERE agent_id = $1
            ORDER BY snapshot_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .map(|row| row.try_get("snapshot_at"))
        .transpose()
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if let Some(persisted) = latest {
            if persisted > snapshot.snapshot_at {
                warn!(
                    agent_id,
                    incoming = %snapshot.snapshot_at,
                    persisted = %persisted,
                    "Skipping stale snapshot write"
                );
                metrics::counter!(crate::telemetry::STALE_SNAPSHOT_SKIPPED_TOTAL).increment(1);
                return Ok(SnapshotWriteOutcome::SkippedStale);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO autonomy_state (agent_id, state, consecutive_errors, snapshot_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(agent_id)
        .bind(snapshot.state.to_string())
        .bind(snapshot.consecutive_errors as i32)
        .bind(snapshot.snapshot_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(SnapshotWriteOutcome::Persisted)
    }

    async fn latest(&self, agent_id: &str) -> Result<Option<PersistedSnapshot>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, agent_id, state, consecutive_errors, snapshot_at
            FROM autonomy_state
            WHERE agent_id = $1
            ORDER BY snapshot_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let state_raw: String = row
            .try_get("state")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let state = KernelState::parse(&state_raw).ok_or_else(|| {
            RepositoryError::Serialization(format!("unknown kernel state '{}'", state_raw))
        })?;
        let consecutive_errors: i32 = row
            .try_get("consecutive_errors")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(Some(PersistedSnapshot {
            id: row
                .try_get("id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            agent_id: row
                .try_get("agent_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            snapshot: StateSnapshot {
                state,
                consecutive_errors: consecutive_errors.max(0) as u32,
                snapshot_at: row
                    .try_get("snapshot_at")
                    .map_err(|e| RepositoryError::Database(e.to_string()))?,
            },
        }))
    }
}
