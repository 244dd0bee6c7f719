// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retention Domain Model
//!
//! Audit retention records: created at write time with a policy-derived
//! expiry, exported (marked, not removed) when expired, evicted only by an
//! explicit sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetentionRecordId(pub Uuid);

impl RetentionRecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RetentionRecordId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionRecordType {
    Event,
    Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub id: RetentionRecordId,
    pub record_type: RetentionRecordType,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retain_until: DateTime<Utc>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl RetentionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.retain_until <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub retention_ms: i64,
}

impl RetentionPolicy {
    pub fn retention(&self) -> Duration {
        Duration::milliseconds(self.retention_ms)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        // 90 days.
        Self {
            retention_ms: 90 * 24 * 60 * 60 * 1000,
        }
    }
}
