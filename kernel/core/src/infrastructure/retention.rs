// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit Retention Manager
//!
//! Lifecycle: records are created at write time with
//! `retain_until = now + policy.retention_ms`; expired records are exported
//! (marked, not removed); eviction happens only through an explicit sweep,
//! and only for records that have already been exported.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::domain::retention::{
    RetentionPolicy, RetentionRecord, RetentionRecordId, RetentionRecordType,
};

pub struct RetentionManager {
    policy: RetentionPolicy,
    records: Mutex<Vec<RetentionRecord>>,
}

impl RetentionManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Record data under retention. Returns the record id.
    pub fn add(&self, record_type: RetentionRecordType, data: serde_json::Value) -> RetentionRecordId {
        let now = Utc::now();
        let record = RetentionRecord {
            id: RetentionRecordId::new(),
            record_type,
            data,
            created_at: now,
            retain_until: now + self.policy.retention(),
            exported_at: None,
        };
        let id = record.id;
        self.records.lock().push(record);
        id
    }

    /// Mark expired, unexported records as exported and return them. The
    /// records stay in place: export never removes.
    pub fn export_expired(&self, now: DateTime<Utc>) -> Vec<RetentionRecord> {
        let mut records = self.records.lock();
        let mut exported = Vec::new();
        for record in records.iter_mut() {
            if record.is_expired(now) && record.exported_at.is_none() {
                record.exported_at = Some(now);
                exported.push(record.clone());
            }
        }
        if !exported.is_empty() {
            info!(count = exported.len(), "Exported expired retention records");
        }
        exported
    }

    /// Evict expired records that have been exported. Returns evicted count.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|record| !(record.is_expired(now) && record.exported_at.is_some()));
        let evicted = before - records.len();
        if evicted > 0 {
            info!(evicted, "Retention sweep complete");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager(retention_ms: i64) -> RetentionManager {
        RetentionManager::new(RetentionPolicy { retention_ms })
    }

    #[test]
    fn expired_records_are_exported_not_removed() {
        let manager = manager(1_000);
        manager.add(RetentionRecordType::Event, serde_json::json!({"n": 1}));

        let later = Utc::now() + Duration::seconds(5);
        let exported = manager.export_expired(later);
        assert_eq!(exported.len(), 1);
        assert!(exported[0].exported_at.is_some());
        // Still present until a sweep.
        assert_eq!(manager.len(), 1);

        // A second export pass finds nothing new.
        assert!(manager.export_expired(later).is_empty());
    }

    #[test]
    fn sweep_evicts_only_exported_expired_records() {
        let manager = manager(1_000);
        manager.add(RetentionRecordType::Event, serde_json::json!({"n": 1}));
        manager.add(RetentionRecordType::Audit, serde_json::json!({"n": 2}));

        let later = Utc::now() + Duration::seconds(5);
        // Not exported yet: sweep must not evict.
        assert_eq!(manager.sweep(later), 0);
        assert_eq!(manager.len(), 2);

        manager.export_expired(later);
        assert_eq!(manager.sweep(later), 2);
        assert!(manager.is_empty());
    }

    #[test]
    fn unexpired_records_are_untouched() {
        let manager = manager(60 * 60 * 1000);
        manager.add(RetentionRecordType::Event, serde_json::json!({}));

        let now = Utc::now();
        assert!(manager.export_expired(now).is_empty());
        assert_eq!(manager.sweep(now), 0);
        assert_eq!(manager.len(), 1);
    }
}
