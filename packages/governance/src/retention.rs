//! Data retention with legal-hold override.
//!
//! Each data type carries a TTL; a sweep classifies tracked records as
//! retained, archived, deleted or held. Records under legal hold are never
//! deleted, whatever their age. Hard deletion only happens once the hold is
//! released and the TTL has expired.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Action a policy prescribes once the TTL expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionAction {
    Retain,
    Archive,
    Delete,
}

/// Per-type retention policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: String,
    pub data_type: String,
    pub retention_days: i64,
    pub action: RetentionAction,
    /// Archive this many days before final action, when set
    pub archive_after_days: Option<i64>,
}

/// A tracked record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub record_id: String,
    pub data_type: String,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub legal_hold: bool,
    pub legal_hold_reason: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionSweep {
    pub retained: Vec<String>,
    pub archived: Vec<String>,
    pub deleted: Vec<String>,
    pub held: Vec<String>,
}

/// Default healthcare retention windows, in days.
fn default_policies() -> Vec<RetentionPolicy> {
    fn policy(data_type: &str, days: i64) -> RetentionPolicy {
        RetentionPolicy {
            id: format!("default-{data_type}"),
            data_type: data_type.to_string(),
            retention_days: days,
            action: RetentionAction::Delete,
            archive_after_days: (days > 365).then(|| days - 365),
        }
    }
    vec![
        policy("patient_record", 365 * 7),
        policy("audit_log", 365 * 7),
        policy("billing", 365 * 7),
        policy("consent", 365 * 10),
        policy("temp", 90),
    ]
}

/// Retention manager.
pub struct RetentionManager {
    policies: RwLock<HashMap<String, RetentionPolicy>>,
    records: RwLock<HashMap<String, RetentionRecord>>,
}

impl RetentionManager {
    pub fn new() -> Self {
        let manager = Self {
            policies: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
        };
        for policy in default_policies() {
            manager.register_policy(policy);
        }
        manager
    }

    pub fn register_policy(&self, policy: RetentionPolicy) {
        tracing::info!(
            policy_id = %policy.id,
            data_type = %policy.data_type,
            days = policy.retention_days,
            "Retention policy registered"
        );
        self.policies
            .write()
            .insert(policy.data_type.clone(), policy);
    }

    /// Start tracking a record under its type's policy.
    pub fn track(
        &self,
        record_id: impl Into<String>,
        data_type: impl Into<String>,
        tenant_id: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
    ) {
        let record_id = record_id.into();
        self.records.write().insert(
            record_id.clone(),
            RetentionRecord {
                record_id,
                data_type: data_type.into(),
                tenant_id: tenant_id.into(),
                created_at: created_at.unwrap_or_else(Utc::now),
                legal_hold: false,
                legal_hold_reason: None,
                archived_at: None,
                deleted_at: None,
            },
        );
    }

    /// Apply a legal hold; the record can no longer be deleted.
    pub fn apply_legal_hold(&self, record_id: &str, reason: impl Into<String>) -> bool {
        let mut records = self.records.write();
        match records.get_mut(record_id) {
            Some(record) => {
                record.legal_hold = true;
                record.legal_hold_reason = Some(reason.into());
                tracing::warn!(record_id = %record_id, "Legal hold applied");
                true
            }
            None => false,
        }
    }

    pub fn release_legal_hold(&self, record_id: &str) -> bool {
        let mut records = self.records.write();
        match records.get_mut(record_id) {
            Some(record) => {
                record.legal_hold = false;
                record.legal_hold_reason = None;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, record_id: &str) -> Option<RetentionRecord> {
        self.records.read().get(record_id).cloned()
    }

    /// Sweep all tracked records against their policies at `now`.
    pub fn process(&self, now: DateTime<Utc>) -> RetentionSweep {
        let policies = self.policies.read();
        let mut records = self.records.write();
        let mut sweep = RetentionSweep::default();

        for record in records.values_mut() {
            if record.deleted_at.is_some() {
                continue;
            }
            if record.legal_hold {
                sweep.held.push(record.record_id.clone());
                continue;
            }

            let Some(policy) = policies.get(&record.data_type) else {
                sweep.retained.push(record.record_id.clone());
                continue;
            };

            let age = now - record.created_at;
            if age >= Duration::days(policy.retention_days) {
                match policy.action {
                    RetentionAction::Delete => {
                        record.deleted_at = Some(now);
                        sweep.deleted.push(record.record_id.clone());
                    }
                    RetentionAction::Archive => {
                        record.archived_at = Some(now);
                        sweep.archived.push(record.record_id.clone());
                    }
                    RetentionAction::Retain => sweep.retained.push(record.record_id.clone()),
                }
            } else if let Some(archive_days) = policy.archive_after_days {
                if age >= Duration::days(archive_days) && record.archived_at.is_none() {
                    record.archived_at = Some(now);
                    sweep.archived.push(record.record_id.clone());
                } else {
                    sweep.retained.push(record.record_id.clone());
                }
            } else {
                sweep.retained.push(record.record_id.clone());
            }
        }

        tracing::info!(
            deleted = sweep.deleted.len(),
            archived = sweep.archived.len(),
            held = sweep.held.len(),
            "Retention sweep complete"
        );
        sweep
    }
}

impl Default for RetentionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_retained() {
        let manager = RetentionManager::new();
        manager.track("rec-1", "patient_record", "t", None);

        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.retained, vec!["rec-1"]);
        assert!(sweep.deleted.is_empty());
    }

    #[test]
    fn test_expired_record_deleted() {
        let manager = RetentionManager::new();
        let old = Utc::now() - Duration::days(100);
        manager.track("rec-1", "temp", "t", Some(old));

        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.deleted, vec!["rec-1"]);
        assert!(manager.get("rec-1").unwrap().deleted_at.is_some());
    }

    #[test]
    fn test_legal_hold_blocks_deletion() {
        let manager = RetentionManager::new();
        let old = Utc::now() - Duration::days(100);
        manager.track("rec-1", "temp", "t", Some(old));
        manager.apply_legal_hold("rec-1", "litigation");

        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.held, vec!["rec-1"]);
        assert!(sweep.deleted.is_empty());

        // Hold released → next sweep deletes
        manager.release_legal_hold("rec-1");
        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.deleted, vec!["rec-1"]);
    }

    #[test]
    fn test_archive_before_final_action() {
        let manager = RetentionManager::new();
        // patient_record archives after 6 years, deletes after 7
        let six_years_ago = Utc::now() - Duration::days(365 * 6 + 30);
        manager.track("rec-1", "patient_record", "t", Some(six_years_ago));

        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.archived, vec!["rec-1"]);
        assert!(manager.get("rec-1").unwrap().archived_at.is_some());
    }

    #[test]
    fn test_unknown_type_retained() {
        let manager = RetentionManager::new();
        manager.track("rec-1", "mystery", "t", Some(Utc::now() - Duration::days(9999)));
        let sweep = manager.process(Utc::now());
        assert_eq!(sweep.retained, vec!["rec-1"]);
    }
}
