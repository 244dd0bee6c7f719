// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL Entity Memory Store
//!
//! Cross-session entity-scoped memory tiers in `canonical_entities` and
//! `entity_memories`. Supersede marks lineage rather than deleting; promote
//! clears the mid-term expiry.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE canonical_entities (
//!     id         UUID PRIMARY KEY,
//!     agent_id   TEXT NOT NULL,
//!     name       TEXT NOT NULL,
//!     kind       TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (agent_id, name, kind)
//! );
//! CREATE TABLE entity_memories (
//!     id            UUID PRIMARY KEY,
//!     entity_id     UUID NOT NULL REFERENCES canonical_entities(id),
//!     tier          TEXT NOT NULL,
//!     content       TEXT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     expires_at    TIMESTAMPTZ,
//!     superseded_by UUID
//! );
//! CREATE INDEX idx_entity_memories_entity ON entity_memories (entity_id, created_at);
//! ```

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::memory::{
    CanonicalEntity, EntityId, EntityMemory, EntityMemoryId, MemoryTier,
};
use crate::domain::repository::RepositoryError;
use crate::infrastructure::entity_memory::{EntityMemoryStore, DEFAULT_MID_TERM_TTL_DAYS};

fn tier_to_str(tier: MemoryTier) -> &'static str {
    match tier {
        MemoryTier::MidTerm => "mid-term",
        MemoryTier::LongTerm => "long-term",
    }
}

fn tier_from_str(raw: &str) -> Result<MemoryTier, RepositoryError> {
    match raw {
        "mid-term" => Ok(MemoryTier::MidTerm),
        "long-term" => Ok(MemoryTier::LongTerm),
        other => Err(RepositoryError::Serialization(format!(
            "unknown memory tier '{}'",
            other
        ))),
    }
}

pub struct PgEntityMemoryStore {
    pool: PgPool,
    mid_term_ttl: Duration,
}

impl PgEntityMemoryStore {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            mid_term_ttl: Duration::days(DEFAULT_MID_TERM_TTL_DAYS),
        }
    }

    pub fn with_ttl(pool: PgPool, mid_term_ttl_days: i64) -> Self {
        Self {
            pool,
            mid_term_ttl: Duration::days(mid_term_ttl_days),
        }
    }

    fn row_to_memory(row: &sqlx::postgres::PgRow) -> Result<EntityMemory, RepositoryError> {
        let tier_raw: String = row
            .try_get("tier")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let id: Uuid = row
            .try_get("id")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let entity_id: Uuid = row
            .try_get("entity_id")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let superseded_by: Option<Uuid> = row
            .try_get("superseded_by")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(EntityMemory {
            id: EntityMemoryId(id),
            entity_id: EntityId(entity_id),
            tier: tier_from_str(&tier_raw)?,
            content: row
                .try_get("content")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            expires_at: row
                .try_get("expires_at")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            superseded_by: superseded_by.map(EntityMemoryId),
        })
    }
}

#[async_trait]
impl EntityMemoryStore for PgEntityMemoryStore {
    async fn canonical_entity(
        &self,
        agent_id: &str,
        name: &str,
        kind: &str,
    ) -> Result<CanonicalEntity, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO canonical_entities (id, agent_id, name, kind, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (agent_id, name, kind) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, agent_id, name, kind, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(agent_id)
        .bind(name)
        .bind(kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let id: Uuid = row
            .try_get("id")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(CanonicalEntity {
            id: EntityId(id),
            agent_id: row
                .try_get("agent_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            name: row
                .try_get("name")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            kind: row
                .try_get("kind")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
        })
    }

    async fn remember(
        &self,
        entity_id: EntityId,
        tier: MemoryTier,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError> {
        let expires_at = match tier {
            MemoryTier::MidTerm => Some(Utc::now() + self.mid_term_ttl),
            MemoryTier::LongTerm => None,
        };

        let row = sqlx::query(
            r#"
            INSERT INTO entity_memories (id, entity_id, tier, content, created_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING id, entity_id, tier, content, created_at, expires_at, superseded_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entity_id.0)
        .bind(tier_to_str(tier))
        .bind(content)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Self::row_to_memory(&row)
    }

    async fn supersede(
        &self,
        old_id: EntityMemoryId,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let old = sqlx::query(
            r#"
            SELECT id, entity_id, tier, content, created_at, expires_at, superseded_by
            FROM entity_memories
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(old_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or_else(|| RepositoryError::NotFound(old_id.to_string()))?;
        let old = Self::row_to_memory(&old)?;

        let expires_at = match old.tier {
            MemoryTier::MidTerm => Some(Utc::now() + self.mid_term_ttl),
            MemoryTier::LongTerm => None,
        };
        let row = sqlx::query(
            r#"
            INSERT INTO entity_memories (id, entity_id, tier, content, created_at, expires_at)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            RETURNING id, entity_id, tier, content, created_at, expires_at, superseded_by
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(old.entity_id.0)
        .bind(tier_to_str(old.tier))
        .bind(content)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let replacement = Self::row_to_memory(&row)?;

        sqlx::query(
            r#"
            UPDATE entity_memories
            SET superseded_by = $1
            WHERE id = $2
            "#,
        )
        .bind(replacement.id.0)
        .bind(old_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(replacement)
    }

    async fn promote(&self, id: EntityMemoryId) -> Result<EntityMemory, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE entity_memories
            SET tier = 'long-term', expires_at = NULL
            WHERE id = $1
            RETURNING id, entity_id, tier, content, created_at, expires_at, superseded_by
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?
        .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        Self::row_to_memory(&row)
    }

    async fn recall(&self, entity_id: EntityId) -> Result<Vec<EntityMemory>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, tier, content, created_at, expires_at, superseded_by
            FROM entity_memories
            WHERE entity_id = $1
              AND superseded_by IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY created_at ASC
            "#,
        )
        .bind(entity_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_memory).collect()
    }
}
