// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory Gate Domain Model
//!
//! Candidate memory writes and the allow/quarantine/reject decision point.
//! Entity-scoped memory tiers (mid-term with TTL, long-term permanent) live
//! here too; the stores are in `infrastructure::entity_memory`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::trust::SourceId;

/// A memory write the agent wants to make, before gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub content: String,
    /// Cosine similarity to the closest existing memory, 0-1, computed by
    /// the host's vector store. 0 when unknown.
    #[serde(default)]
    pub semantic_similarity: f64,
    /// Whether the content carries external links (a quarantine signal).
    #[serde(default)]
    pub has_external_links: bool,
    /// Whether the content conflicts with a core identity value.
    #[serde(default)]
    pub conflicts_with_core_values: bool,
}

/// What the gate knows about the writing source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySourceProfile {
    pub source_id: SourceId,
    pub verified: bool,
    pub age_days: f64,
    pub prior_interactions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Allow,
    Quarantine,
    Reject,
}

impl std::fmt::Display for GateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateAction::Allow => "allow",
            GateAction::Quarantine => "quarantine",
            GateAction::Reject => "reject",
        };
        write!(f, "{}", s)
    }
}

/// Gate verdict. Deterministic for a fixed `(features, model-state)` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryGateDecision {
    pub action: GateAction,
    pub reason: String,
    pub trust_score: f64,
}

/// Fixed-order feature vector fed to the scoring model.
///
/// Order matters: model coefficients are persisted positionally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryFeatures {
    pub trust_score: f64,
    pub source_verified: f64,
    pub source_age: f64,
    pub prior_interactions: f64,
    pub semantic_similarity: f64,
    pub no_external_links: f64,
    pub core_value_clear: f64,
}

impl MemoryFeatures {
    pub const DIM: usize = 7;

    pub const NAMES: [&'static str; Self::DIM] = [
        "trust_score",
        "source_verified",
        "source_age",
        "prior_interactions",
        "semantic_similarity",
        "no_external_links",
        "core_value_clear",
    ];

    pub fn as_array(&self) -> [f64; Self::DIM] {
        [
            self.trust_score,
            self.source_verified,
            self.source_age,
            self.prior_interactions,
            self.semantic_similarity,
            self.no_external_links,
            self.core_value_clear,
        ]
    }
}

/// Scoring model output contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub accept_probability: f64,
    pub action: GateAction,
    pub confidence: f64,
    pub feature_importances: Vec<(String, f64)>,
}

/// Label for online model adaptation from gate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLabel {
    Allowed,
    Rejected,
}

// ── Entity-scoped memory tiers ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMemoryId(pub Uuid);

impl EntityMemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityMemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityMemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A canonical entity that memories attach to (a person, a repo, a service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: EntityId,
    pub agent_id: String,
    pub name: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Expires after the configured TTL (default 30 days).
    MidTerm,
    /// Permanent.
    LongTerm,
}

/// An entity-scoped memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMemory {
    pub id: EntityMemoryId,
    pub entity_id: EntityId,
    pub tier: MemoryTier,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set when a newer entry supersedes this one; lineage is kept.
    pub superseded_by: Option<EntityMemoryId>,
}

impl EntityMemory {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}
