// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity Configuration Domain Model
//!
//! An agent's identity is the baseline the auditor measures drift against:
//! core values the memory gate protects, and persona markers expected in
//! agent output. Versions are append-only; exactly one active per agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::events::normalize_payload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub agent_id: String,
    /// Values a candidate memory must not interfere with.
    pub core_values: Vec<String>,
    /// Markers the auditor expects to see in agent output.
    pub persona_baseline: Vec<String>,
}

impl IdentityConfig {
    /// Content hash over the canonical JSON form, for version integrity.
    pub fn content_hash(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let mut hasher = Sha256::new();
        hasher.update(normalize_payload(&value).as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One row of the append-only identity version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityVersion {
    pub version: i64,
    pub identity: IdentityConfig,
    pub hash: String,
    pub agent_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_content_sensitive() {
        let identity = IdentityConfig {
            agent_id: "agent-1".to_string(),
            core_values: vec!["honesty".to_string()],
            persona_baseline: vec!["concise".to_string()],
        };
        let first = identity.content_hash();
        assert_eq!(first, identity.content_hash());

        let mut changed = identity.clone();
        changed.core_values.push("caution".to_string());
        assert_ne!(first, changed.content_hash());
    }
}
