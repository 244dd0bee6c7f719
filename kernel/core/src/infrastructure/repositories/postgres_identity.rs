// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL Identity Store
//!
//! Append-only identity version history in `autonomy_identity`. Activating
//! a new version deactivates the previous one in the same transaction, so
//! exactly one `active = true` row exists per agent.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE autonomy_identity (
//!     version    BIGINT NOT NULL,
//!     identity   JSONB NOT NULL,
//!     hash       TEXT NOT NULL,
//!     agent_id   TEXT NOT NULL,
//!     active     BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (agent_id, version)
//! );
//! CREATE UNIQUE INDEX idx_autonomy_identity_active
//!     ON autonomy_identity (agent_id) WHERE active;
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::identity::{IdentityConfig, IdentityVersion};
use crate::domain::repository::{IdentityStore, RepositoryError};

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_version(row: &sqlx::postgres::PgRow) -> Result<IdentityVersion, RepositoryError> {
        let identity_json: serde_json::Value = row
            .try_get("identity")
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let identity: IdentityConfig = serde_json::from_value(identity_json)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        Ok(IdentityVersion {
            version: row
                .try_get("version")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            identity,
            hash: row
                .try_get("hash")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            agent_id: row
                .try_get("agent_id")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            active: row
                .try_get("active")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| RepositoryError::Database(e.to_string()))?,
        })
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn put_version(
        &self,
        identity: &IdentityConfig,
    ) -> Result<IdentityVersion, RepositoryError> {
        let identity_json = serde_json::to_value(identity)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let hash = identity.content_hash();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE autonomy_identity
            SET active = FALSE
            WHERE agent_id = $1 AND active
            "#,
        )
        .bind(&identity.agent_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO autonomy_identity (version, identity, hash, agent_id, active, created_at)
            VALUES (
                COALESCE(
                    (SELECT MAX(version) FROM autonomy_identity WHERE agent_id = $1),
                    0
                ) + 1,
                $2, $3, $1, TRUE, NOW()
            )
            RETURNING version, identity, hash, agent_id, active, created_at
            "#,
        )
        .bind(&identity.agent_id)
        .bind(identity_json)
        .bind(hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Self::row_to_version(&row)
    }

    async fn active(&self, agent_id: &str) -> Result<Option<IdentityVersion>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT version, identity, hash, agent_id, active, created_at
            FROM autonomy_identity
            WHERE agent_id = $1 AND active
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        row.as_ref().map(Self::row_to_version).transpose()
    }

    async fn history(&self, agent_id: &str) -> Result<Vec<IdentityVersion>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT version, identity, hash, agent_id, active, created_at
            FROM autonomy_identity
            WHERE agent_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_version).collect()
    }
}
