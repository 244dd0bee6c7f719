// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL Event Store
//!
//! Hash-chained event log in `autonomy_events`. Appends run in a
//! transaction that reads the agent's terminal hash and inserts the new row,
//! so the chain is never written out of sequence order. The backfill
//! migration recomputes chains for rows written before hashing existed,
//! grouped by agent, ordered by row id.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE autonomy_events (
//!     id             BIGSERIAL PRIMARY KEY,
//!     request_id     TEXT NOT NULL,
//!     type           TEXT NOT NULL,
//!     payload        JSONB NOT NULL,
//!     correlation_id TEXT,
//!     agent_id       TEXT NOT NULL,
//!     timestamp      TIMESTAMPTZ NOT NULL,
//!     prev_hash      TEXT,
//!     event_hash     TEXT NOT NULL DEFAULT ''
//! );
//! CREATE INDEX idx_autonomy_events_agent ON autonomy_events (agent_id, id);
//! CREATE INDEX idx_autonomy_events_correlation ON autonomy_events (correlation_id);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::info;

use crate::domain::events::{compute_event_hash, verify_chain, EventRecord, NewEvent};
use crate::domain::repository::{EventStore, RepositoryError};

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<EventRecord, RepositoryError> {
        Ok(EventRecord {
            sequence_id: row
                .try_get("id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            request_id: row
                .try_get("request_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            event_type: row
                .try_get("type")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            payload: row
                .try_get("payload")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            timestamp: row
                .try_get("timestamp")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            correlation_id: row
                .try_get("correlation_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            agent_id: row
                .try_get("agent_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            prev_hash: row
                .try_get("prev_hash")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            event_hash: row
                .try_get("event_hash")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
        })
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<i64, RepositoryError> {
        let timestamp = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        // Terminal hash for this agent's lineage. FOR UPDATE serializes
        // concurrent appends for the same agent so the chain cannot fork.
        let prev_hash: Option<String> = sqlx::query(
            r#"
            SELECT event_hash
            FROM autonomy_events
            WHERE agent_id = $1
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&event.agent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .map(|row| row.try_get("event_hash"))
        .transpose()
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let event_hash = compute_event_hash(
            &event.request_id,
            &event.event_type,
            &event.payload,
            timestamp,
            prev_hash.as_deref(),
            event.correlation_id.as_deref(),
        );

        let row = sqlx::query(
            r#"
            INSERT INTO autonomy_events
                (request_id, type, payload, correlation_id, agent_id, timestamp, prev_hash, event_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&event.request_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.correlation_id)
        .bind(&event.agent_id)
        .bind(timestamp)
        .bind(&prev_hash)
        .bind(&event_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.try_get("id")
            .map_err(|e| RepositoryError::Database(e.to_string()))
    }

    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<EventRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, type, payload, correlation_id, agent_id, timestamp, prev_hash, event_hash
            FROM autonomy_events
            WHERE agent_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn events_for_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<EventRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, type, payload, correlation_id, agent_id, timestamp, prev_hash, event_hash
            FROM autonomy_events
            WHERE correlation_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn verify(&self, agent_id: &str) -> Result<(), RepositoryError> {
        let records = self.events_for_agent(agent_id).await?;
        verify_chain(&records).map_err(|e| RepositoryError::Database(e.to_string()))
    }

    async fn backfill(&self) -> Result<u64, RepositoryError> {
        let agents: Vec<String> = sqlx::query(
            r#"
            SELECT DISTINCT agent_id
            FROM autonomy_events
            ORDER BY agent_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .iter()
        .map(|row| row.try_get("agent_id"))
        .collect::<Result<_, _>>()
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let mut updated = 0u64;
        for agent in agents {
            let records = self.events_for_agent(&agent).await?;
            let mut prev: Option<String> = None;

            for record in records {
                let expected = compute_event_hash(
                    &record.request_id,
                    &record.event_type,
                    &record.payload,
                    record.timestamp,
                    prev.as_deref(),
                    record.correlation_id.as_deref(),
                );
                if record.event_hash != expected
                    || record.prev_hash.as_deref() != prev.as_deref()
                {
                    sqlx::query(
                        r#"
                        UPDATE autonomy_events
                        SET prev_hash = $1, event_hash = $2
                        WHERE id = $3
                        "#,
                    )
                    .bind(&prev)
                    .bind(&expected)
                    .bind(record.sequence_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RepositoryError::Database(e.to_string()))?;
                    updated += 1;
                }
                prev = Some(expected);
            }
        }

        info!(updated, "Event chain backfill complete");
        Ok(updated)
    }
}
