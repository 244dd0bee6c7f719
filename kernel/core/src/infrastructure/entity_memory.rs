// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Entity-Scoped Memory Tiers
//!
//! Cross-session memory attached to canonical entities, in two tiers:
//! mid-term (TTL, default 30 days) and long-term (permanent). Entries are
//! superseded, never edited in place; promotion moves a mid-term entry to
//! long-term and clears its expiry.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::memory::{
    CanonicalEntity, EntityId, EntityMemory, EntityMemoryId, MemoryTier,
};
use crate::domain::repository::RepositoryError;

/// Default mid-term TTL: 30 days.
pub const DEFAULT_MID_TERM_TTL_DAYS: i64 = 30;

#[async_trait]
pub trait EntityMemoryStore: Send + Sync {
    /// Find or create the canonical entity for `(agent_id, name, kind)`.
    async fn canonical_entity(
        &self,
        agent_id: &str,
        name: &str,
        kind: &str,
    ) -> Result<CanonicalEntity, RepositoryError>;

    /// Record a memory against an entity. Mid-term entries get the
    /// configured TTL; long-term entries never expire.
    async fn remember(
        &self,
        entity_id: EntityId,
        tier: MemoryTier,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError>;

    /// Replace an entry with new content, keeping lineage: the old entry is
    /// marked superseded, not removed.
    async fn supersede(
        &self,
        old_id: EntityMemoryId,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError>;

    /// Promote a mid-term entry to long-term, clearing its expiry.
    async fn promote(&self, id: EntityMemoryId) -> Result<EntityMemory, RepositoryError>;

    /// Live (non-superseded, non-expired) memories for an entity.
    async fn recall(&self, entity_id: EntityId) -> Result<Vec<EntityMemory>, RepositoryError>;
}

/// In-memory reference implementation.
pub struct InMemoryEntityMemoryStore {
    entities: RwLock<Vec<CanonicalEntity>>,
    memories: RwLock<HashMap<EntityMemoryId, EntityMemory>>,
    mid_term_ttl: Duration,
}

impl InMemoryEntityMemoryStore {
    pub fn new(mid_term_ttl_days: i64) -> Self {
        Self {
            entities: RwLock::new(Vec::new()),
            memories: RwLock::new(HashMap::new()),
            mid_term_ttl: Duration::days(mid_term_ttl_days),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_MID_TERM_TTL_DAYS)
    }
}

impl Default for InMemoryEntityMemoryStore {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

#[async_trait]
impl EntityMemoryStore for InMemoryEntityMemoryStore {
    async fn canonical_entity(
        &self,
        agent_id: &str,
        name: &str,
        kind: &str,
    ) -> Result<CanonicalEntity, RepositoryError> {
        {
            let entities = self.entities.read();
            if let Some(existing) = entities
                .iter()
                .find(|e| e.agent_id == agent_id && e.name == name && e.kind == kind)
            {
                return Ok(existing.clone());
            }
        }

        let entity = CanonicalEntity {
            id: EntityId::new(),
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            created_at: Utc::now(),
        };
        debug!(entity_id = %entity.id, name, kind, "Canonical entity created");
        self.entities.write().push(entity.clone());
        Ok(entity)
    }

    async fn remember(
        &self,
        entity_id: EntityId,
        tier: MemoryTier,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError> {
        let now = Utc::now();
        let memory = EntityMemory {
            id: EntityMemoryId::new(),
            entity_id,
            tier,
            content: content.to_string(),
            created_at: now,
            expires_at: match tier {
                MemoryTier::MidTerm => Some(now + self.mid_term_ttl),
                MemoryTier::LongTerm => None,
            },
            superseded_by: None,
        };
        self.memories.write().insert(memory.id, memory.clone());
        Ok(memory)
    }

    async fn supersede(
        &self,
        old_id: EntityMemoryId,
        content: &str,
    ) -> Result<EntityMemory, RepositoryError> {
        let (entity_id, tier) = {
            let memories = self.memories.read();
            let old = memories
                .get(&old_id)
                .ok_or_else(|| RepositoryError::NotFound(old_id.to_string()))?;
            (old.entity_id, old.tier)
        };

        let replacement = self.remember(entity_id, tier, content).await?;
        if let Some(old) = self.memories.write().get_mut(&old_id) {
            old.superseded_by = Some(replacement.id);
        }
        Ok(replacement)
    }

    async fn promote(&self, id: EntityMemoryId) -> Result<EntityMemory, RepositoryError> {
        let mut memories = self.memories.write();
        let memory = memories
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        memory.tier = MemoryTier::LongTerm;
        memory.expires_at = None;
        Ok(memory.clone())
    }

    async fn recall(&self, entity_id: EntityId) -> Result<Vec<EntityMemory>, RepositoryError> {
        let now = Utc::now();
        let mut memories: Vec<EntityMemory> = self
            .memories
            .read()
            .values()
            .filter(|m| {
                m.entity_id == entity_id && m.superseded_by.is_none() && !m.is_expired(now)
            })
            .cloned()
            .collect();
        memories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(memories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canonical_entity_is_idempotent() {
        let store = InMemoryEntityMemoryStore::with_default_ttl();
        let first = store
            .canonical_entity("agent-1", "billing-service", "service")
            .await
            .unwrap();
        let second = store
            .canonical_entity("agent-1", "billing-service", "service")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn mid_term_gets_ttl_long_term_does_not() {
        let store = InMemoryEntityMemoryStore::with_default_ttl();
        let entity = store
            .canonical_entity("agent-1", "repo", "repository")
            .await
            .unwrap();

        let mid = store
            .remember(entity.id, MemoryTier::MidTerm, "flaky CI on main")
            .await
            .unwrap();
        assert!(mid.expires_at.is_some());

        let long = store
            .remember(entity.id, MemoryTier::LongTerm, "uses trunk-based development")
            .await
            .unwrap();
        assert!(long.expires_at.is_none());
    }

    #[tokio::test]
    async fn supersede_keeps_lineage_and_hides_old_entry() {
        let store = InMemoryEntityMemoryStore::with_default_ttl();
        let entity = store
            .canonical_entity("agent-1", "owner", "person")
            .await
            .unwrap();
        let original = store
            .remember(entity.id, MemoryTier::MidTerm, "prefers tabs")
            .await
            .unwrap();

        let replacement = store
            .supersede(original.id, "prefers spaces")
            .await
            .unwrap();

        let recalled = store.recall(entity.id).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].id, replacement.id);
        assert_eq!(recalled[0].content, "prefers spaces");
    }

    #[tokio::test]
    async fn promote_clears_expiry() {
        let store = InMemoryEntityMemoryStore::with_default_ttl();
        let entity = store
            .canonical_entity("agent-1", "api", "service")
            .await
            .unwrap();
        let memory = store
            .remember(entity.id, MemoryTier::MidTerm, "rate limit is 100 rps")
            .await
            .unwrap();

        let promoted = store.promote(memory.id).await.unwrap();
        assert_eq!(promoted.tier, MemoryTier::LongTerm);
        assert!(promoted.expires_at.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_not_recalled() {
        // Zero-day TTL expires immediately.
        let store = InMemoryEntityMemoryStore::new(0);
        let entity = store
            .canonical_entity("agent-1", "cache", "service")
            .await
            .unwrap();
        store
            .remember(entity.id, MemoryTier::MidTerm, "ephemeral note")
            .await
            .unwrap();

        assert!(store.recall(entity.id).await.unwrap().is_empty());
    }
}
