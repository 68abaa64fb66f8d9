//! Hash-chained, append-only audit log.
//!
//! Every entry's hash covers a canonical rendering of the entry plus the
//! previous entry's hash, so altering any persisted field breaks the chain
//! from that point forward. `verify_integrity` walks the log, recomputes
//! each hash and reports the first entry that fails.
//!
//! Writes are serialized through a single mutex; that is what keeps
//! `prev_hash` consistent under concurrent callers.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_governance::audit::{AuditService, AuditCategory};
//!
//! let audit = AuditService::new();
//! audit.log_access("dr-chen", "Patient", "Patient/1", "tenant-a", "treatment", None);
//! assert!(audit.verify_integrity().is_ok());
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Length of the truncated chain hash, in hex chars.
const HASH_LEN: usize = 32;

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Access,
    Denied,
    Modify,
    Export,
    BreakGlass,
    Authentication,
    ConsentCheck,
}

/// Severity attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Alert,
    Critical,
}

/// A single audit entry. Append-only; never mutated after `log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub category: AuditCategory,
    pub action: String,
    pub actor_id: String,
    pub actor_email: Option<String>,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub patient_id: Option<String>,
    pub purpose: Option<String>,
    pub outcome: String,
    pub severity: AuditSeverity,
    pub ip_address: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub prev_hash: Option<String>,
    pub hash: String,
}

/// Draft of an entry before it is chained. Everything except hashes.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub category: AuditCategory,
    pub action: String,
    pub actor_id: String,
    pub actor_email: Option<String>,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub patient_id: Option<String>,
    pub purpose: Option<String>,
    pub outcome: String,
    pub severity: AuditSeverity,
    pub ip_address: Option<String>,
    pub metadata: Value,
}

impl AuditDraft {
    pub fn new(
        category: AuditCategory,
        action: impl Into<String>,
        actor_id: impl Into<String>,
        tenant_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            category,
            action: action.into(),
            actor_id: actor_id.into(),
            actor_email: None,
            tenant_id: tenant_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            patient_id: None,
            purpose: None,
            outcome: "success".to_string(),
            severity: AuditSeverity::Info,
            ip_address: None,
            metadata: Value::Null,
        }
    }

    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filters for querying the log.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub tenant_id: Option<String>,
    pub category: Option<AuditCategory>,
    pub actor_id: Option<String>,
    pub patient_id: Option<String>,
    pub resource_type: Option<String>,
    pub outcome: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

impl AuditQuery {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            limit: 100,
            ..Default::default()
        }
    }

    fn matches(&self, e: &AuditEntry) -> bool {
        self.tenant_id.as_deref().map_or(true, |t| e.tenant_id == t)
            && self.category.map_or(true, |c| e.category == c)
            && self.actor_id.as_deref().map_or(true, |a| e.actor_id == a)
            && self
                .patient_id
                .as_deref()
                .map_or(true, |p| e.patient_id.as_deref() == Some(p))
            && self
                .resource_type
                .as_deref()
                .map_or(true, |r| e.resource_type == r)
            && self.outcome.as_deref().map_or(true, |o| e.outcome == o)
            && self.start_time.map_or(true, |t| e.ts >= t)
            && self.end_time.map_or(true, |t| e.ts <= t)
    }
}

/// Out-of-band destination for CRITICAL events (SIEM hook).
pub trait AlertSink: Send + Sync {
    fn notify(&self, entry: &AuditEntry);
}

/// Default sink: a CRITICAL tracing event.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, entry: &AuditEntry) {
        tracing::error!(
            entry_id = %entry.id,
            category = ?entry.category,
            actor_id = %entry.actor_id,
            tenant_id = %entry.tenant_id,
            "CRITICAL audit event"
        );
    }
}

struct ChainState {
    entries: Vec<AuditEntry>,
    last_hash: Option<String>,
}

/// Append-only audit trail service. Owns its storage exclusively.
pub struct AuditService {
    chain: Mutex<ChainState>,
    alert_sink: Arc<dyn AlertSink>,
}

impl AuditService {
    pub fn new() -> Self {
        Self::with_alert_sink(Arc::new(TracingAlertSink))
    }

    pub fn with_alert_sink(alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            chain: Mutex::new(ChainState {
                entries: Vec::new(),
                last_hash: None,
            }),
            alert_sink,
        }
    }

    /// Append an entry to the chain.
    pub fn log(&self, draft: AuditDraft) -> AuditEntry {
        let mut chain = self.chain.lock();

        let mut entry = AuditEntry {
            id: format!("AUD-{}", &Uuid::new_v4().simple().to_string()[..16].to_uppercase()),
            ts: Utc::now(),
            category: draft.category,
            action: draft.action,
            actor_id: draft.actor_id,
            actor_email: draft.actor_email,
            tenant_id: draft.tenant_id,
            resource_type: draft.resource_type,
            resource_id: draft.resource_id,
            patient_id: draft.patient_id,
            purpose: draft.purpose,
            outcome: draft.outcome,
            severity: draft.severity,
            ip_address: draft.ip_address,
            metadata: draft.metadata,
            prev_hash: chain.last_hash.clone(),
            hash: String::new(),
        };
        entry.hash = compute_hash(&entry, chain.last_hash.as_deref());
        chain.last_hash = Some(entry.hash.clone());
        chain.entries.push(entry.clone());
        drop(chain);

        if entry.severity >= AuditSeverity::Alert {
            tracing::warn!(
                entry_id = %entry.id,
                category = ?entry.category,
                action = %entry.action,
                severity = ?entry.severity,
                "Audit alert"
            );
        }
        if entry.severity == AuditSeverity::Critical {
            self.alert_sink.notify(&entry);
        }

        entry
    }

    /// Convenience: resource access.
    pub fn log_access(
        &self,
        actor_id: &str,
        resource_type: &str,
        resource_id: &str,
        tenant_id: &str,
        purpose: &str,
        patient_id: Option<&str>,
    ) -> AuditEntry {
        let mut draft = AuditDraft::new(
            AuditCategory::Access,
            "read",
            actor_id,
            tenant_id,
            resource_type,
            resource_id,
        )
        .purpose(purpose);
        if let Some(p) = patient_id {
            draft = draft.patient(p);
        }
        self.log(draft)
    }

    /// Convenience: denied access (policy or consent refusal).
    pub fn log_denied(
        &self,
        actor_id: &str,
        resource_type: &str,
        resource_id: &str,
        tenant_id: &str,
        reason: &str,
    ) -> AuditEntry {
        self.log(
            AuditDraft::new(
                AuditCategory::Denied,
                "deny",
                actor_id,
                tenant_id,
                resource_type,
                resource_id,
            )
            .outcome("denied")
            .severity(AuditSeverity::Warning)
            .metadata(json!({ "reason": reason })),
        )
    }

    /// Convenience: authentication events.
    pub fn log_authentication(
        &self,
        actor_id: &str,
        tenant_id: &str,
        outcome: &str,
        method: &str,
    ) -> AuditEntry {
        let severity = if outcome == "success" {
            AuditSeverity::Info
        } else {
            AuditSeverity::Warning
        };
        self.log(
            AuditDraft::new(
                AuditCategory::Authentication,
                format!("login:{method}"),
                actor_id,
                tenant_id,
                "session",
                "",
            )
            .outcome(outcome)
            .severity(severity),
        )
    }

    /// Convenience: a consent decision was rendered.
    pub fn log_consent_check(
        &self,
        actor_id: &str,
        patient_id: &str,
        tenant_id: &str,
        allowed: bool,
        reason: &str,
    ) -> AuditEntry {
        self.log(
            AuditDraft::new(
                AuditCategory::ConsentCheck,
                "consent_check",
                actor_id,
                tenant_id,
                "Consent",
                patient_id,
            )
            .patient(patient_id)
            .outcome(if allowed { "allowed" } else { "denied" })
            .metadata(json!({ "reason": reason })),
        )
    }

    /// Break-glass: CRITICAL severity, chain append first, then the
    /// out-of-band sink is notified.
    pub fn log_break_glass(
        &self,
        actor_id: &str,
        patient_id: &str,
        tenant_id: &str,
        justification: &str,
    ) -> AuditEntry {
        self.log(
            AuditDraft::new(
                AuditCategory::BreakGlass,
                "break_glass",
                actor_id,
                tenant_id,
                "Patient",
                patient_id,
            )
            .patient(patient_id)
            .severity(AuditSeverity::Critical)
            .metadata(json!({ "justification": justification })),
        )
    }

    /// Walk the chain, recomputing every hash. Returns the id of the first
    /// entry that fails, or `Ok(())` when the chain head verifies.
    pub fn verify_integrity(&self) -> Result<(), String> {
        let chain = self.chain.lock();
        let mut prev_hash: Option<String> = None;
        for entry in &chain.entries {
            if entry.prev_hash != prev_hash {
                return Err(entry.id.clone());
            }
            let expected = compute_hash(entry, prev_hash.as_deref());
            if entry.hash != expected {
                return Err(entry.id.clone());
            }
            prev_hash = Some(entry.hash.clone());
        }
        Ok(())
    }

    /// Query entries, newest first, with offset/limit pagination.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let chain = self.chain.lock();
        let mut results: Vec<AuditEntry> = chain
            .entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        results.sort_by(|a, b| b.ts.cmp(&a.ts));

        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        results.into_iter().skip(query.offset).take(limit).collect()
    }

    /// Export matching entries as pretty JSON (compliance reporting).
    pub fn export_json(&self, query: &AuditQuery) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.query(query))
    }

    /// Total entries in the chain.
    pub fn len(&self) -> usize {
        self.chain.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, action: &str) {
        self.chain.lock().entries[index].action = action.to_string();
    }
}

impl Default for AuditService {
    fn default() -> Self {
        Self::new()
    }
}

/// `SHA-256(canonical(entry) ⊕ prev_hash)` truncated to 32 hex chars.
/// Canonical form is a JSON object with lexicographically ordered keys over
/// the chained fields.
fn compute_hash(entry: &AuditEntry, prev_hash: Option<&str>) -> String {
    // serde_json::Map preserves insertion order; insert in sorted key order
    let canonical = json!({
        "action": entry.action,
        "actor_id": entry.actor_id,
        "category": entry.category,
        "id": entry.id,
        "prev_hash": prev_hash,
        "resource_id": entry.resource_id,
        "ts": entry.ts.to_rfc3339(),
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    hex::encode(digest)[..HASH_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(audit: &AuditService, n: usize) {
        for i in 0..n {
            audit.log_access(
                "dr-chen",
                "Patient",
                &format!("Patient/{i}"),
                "tenant-a",
                "treatment",
                Some(&format!("Patient/{i}")),
            );
        }
    }

    #[test]
    fn test_chain_links() {
        let audit = AuditService::new();
        access(&audit, 3);

        let entries = audit.query(&AuditQuery::default());
        // newest first; walk oldest → newest
        let ordered: Vec<_> = entries.iter().rev().collect();
        assert!(ordered[0].prev_hash.is_none());
        assert_eq!(ordered[1].prev_hash.as_deref(), Some(ordered[0].hash.as_str()));
        assert_eq!(ordered[2].prev_hash.as_deref(), Some(ordered[1].hash.as_str()));
        assert_eq!(ordered[0].hash.len(), HASH_LEN);
    }

    #[test]
    fn test_verify_clean_chain() {
        let audit = AuditService::new();
        access(&audit, 5);
        assert!(audit.verify_integrity().is_ok());
    }

    #[test]
    fn test_tamper_detected_with_first_failing_id() {
        let audit = AuditService::new();
        access(&audit, 5);
        let tampered_id = {
            let entries = audit.query(&AuditQuery::default());
            entries.iter().rev().nth(2).unwrap().id.clone()
        };

        audit.tamper(2, "export");

        let failing = audit.verify_integrity().unwrap_err();
        assert_eq!(failing, tampered_id);
    }

    #[test]
    fn test_query_filters() {
        let audit = AuditService::new();
        access(&audit, 2);
        audit.log_denied("intruder", "Patient", "Patient/9", "tenant-b", "no policy");

        let denied = audit.query(&AuditQuery {
            category: Some(AuditCategory::Denied),
            ..Default::default()
        });
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].outcome, "denied");

        let tenant_a = audit.query(&AuditQuery::for_tenant("tenant-a"));
        assert_eq!(tenant_a.len(), 2);
    }

    #[test]
    fn test_break_glass_is_critical_and_notifies() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingSink(AtomicUsize);
        impl AlertSink for CountingSink {
            fn notify(&self, _entry: &AuditEntry) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let audit = AuditService::with_alert_sink(sink.clone());

        let entry = audit.log_break_glass("dr-chen", "Patient/1", "tenant-a", "code blue");
        assert_eq!(entry.severity, AuditSeverity::Critical);
        assert_eq!(entry.category, AuditCategory::BreakGlass);
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }
}
