//! Real-time consent enforcement.
//!
//! Decision inputs: `(patient, action, purpose, actor, data_categories)`.
//! Active consents are filtered to the purpose scope (falling back to the
//! TREATMENT scope), then provisions are evaluated with deny precedence:
//! any matching deny refuses the request regardless of overlapping permits.
//! A consent with no provisions is a blanket permit under its scope; a
//! consent whose provisions exist but none match is a deny.

use aegis_ontology::consent::{Consent, ConsentProvision, DataCategory, ProvisionType};
use aegis_tenancy::Purpose;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::AuditService;

/// Result of a consent check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub allowed: bool,
    pub consent_id: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub provisions_applied: Vec<ProvisionType>,
    /// Categories an applied permit narrows access to
    #[serde(default)]
    pub restrictions: Vec<DataCategory>,
}

impl ConsentDecision {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            consent_id: None,
            reason: reason.into(),
            provisions_applied: Vec::new(),
            restrictions: Vec::new(),
        }
    }
}

/// Consent enforcement engine.
pub struct ConsentEngine {
    consents: RwLock<HashMap<String, Vec<Consent>>>,
    audit: Arc<AuditService>,
}

impl ConsentEngine {
    pub fn new(audit: Arc<AuditService>) -> Self {
        Self {
            consents: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Register a consent. An existing ACTIVE consent with the same scope is
    /// superseded (marked inactive).
    pub fn register(&self, consent: Consent) -> String {
        let mut consents = self.consents.write();
        let patient_consents = consents.entry(consent.patient_id.clone()).or_default();

        for existing in patient_consents.iter_mut() {
            if existing.scope == consent.scope
                && existing.status == aegis_ontology::ConsentStatus::Active
            {
                existing.status = aegis_ontology::ConsentStatus::Inactive;
            }
        }

        tracing::info!(
            consent_id = %consent.id,
            patient_id = %consent.patient_id,
            scope = %consent.scope,
            "Consent registered"
        );
        let id = consent.id.clone();
        patient_consents.push(consent);
        id
    }

    /// Mark a consent inactive.
    pub fn revoke(&self, consent_id: &str) -> bool {
        let mut consents = self.consents.write();
        for patient_consents in consents.values_mut() {
            for consent in patient_consents.iter_mut() {
                if consent.id == consent_id {
                    consent.status = aegis_ontology::ConsentStatus::Inactive;
                    tracing::info!(consent_id = %consent_id, "Consent revoked");
                    return true;
                }
            }
        }
        false
    }

    /// ACTIVE, unexpired consents for a patient.
    pub fn active_consents(&self, patient_id: &str) -> Vec<Consent> {
        let now = Utc::now();
        self.consents
            .read()
            .get(patient_id)
            .map(|list| list.iter().filter(|c| c.is_active(now)).cloned().collect())
            .unwrap_or_default()
    }

    /// Render a consent decision. Every decision is audited.
    pub fn check(
        &self,
        patient_id: &str,
        action: &str,
        purpose: Purpose,
        actor: &str,
        data_categories: &[DataCategory],
    ) -> ConsentDecision {
        let categories: Vec<DataCategory> = if data_categories.is_empty() {
            vec![DataCategory::General]
        } else {
            data_categories.to_vec()
        };

        let decision = self.decide(patient_id, action, purpose, actor, &categories);

        let tenant_id = self
            .consents
            .read()
            .get(patient_id)
            .and_then(|list| list.first().map(|c| c.tenant_id.clone()))
            .unwrap_or_default();
        self.audit
            .log_consent_check(actor, patient_id, &tenant_id, decision.allowed, &decision.reason);

        tracing::debug!(
            patient_id = %patient_id,
            action = %action,
            purpose = %purpose,
            allowed = decision.allowed,
            "Consent checked"
        );
        decision
    }

    fn decide(
        &self,
        patient_id: &str,
        action: &str,
        purpose: Purpose,
        actor: &str,
        categories: &[DataCategory],
    ) -> ConsentDecision {
        let active = self.active_consents(patient_id);
        if active.is_empty() {
            return ConsentDecision::deny("no active consent found for patient");
        }

        // Scope match, with TREATMENT as the fallback scope
        let scoped: Vec<&Consent> = {
            let exact: Vec<&Consent> = active
                .iter()
                .filter(|c| c.scope == purpose.as_str())
                .collect();
            if exact.is_empty() {
                active
                    .iter()
                    .filter(|c| c.scope == Purpose::Treatment.as_str())
                    .collect()
            } else {
                exact
            }
        };

        let Some(consent) = scoped.first() else {
            return ConsentDecision::deny(format!("no consent found for purpose: {purpose}"));
        };

        if consent.provisions.is_empty() {
            return ConsentDecision {
                allowed: true,
                consent_id: Some(consent.id.clone()),
                reason: "consent granted (no specific restrictions)".to_string(),
                provisions_applied: Vec::new(),
                restrictions: Vec::new(),
            };
        }

        let now = Utc::now();
        let mut applied = Vec::new();
        let mut permit_matched = false;
        let mut restrictions = Vec::new();

        for provision in &consent.provisions {
            if !provision_matches(provision, action, purpose, actor, categories, now) {
                continue;
            }
            let provision_type = provision.provision_type.unwrap_or(ProvisionType::Permit);
            applied.push(provision_type);

            match provision_type {
                ProvisionType::Deny => {
                    let denied: Vec<String> = categories
                        .iter()
                        .filter(|c| provision.data_categories.contains(c))
                        .map(|c| format!("{c:?}"))
                        .collect();
                    return ConsentDecision {
                        allowed: false,
                        consent_id: Some(consent.id.clone()),
                        reason: format!("consent denies access to: {}", denied.join(", ")),
                        provisions_applied: applied,
                        restrictions: Vec::new(),
                    };
                }
                ProvisionType::Permit => {
                    permit_matched = true;
                    restrictions.extend(provision.data_categories.iter().copied());
                }
            }
        }

        if permit_matched {
            restrictions.sort_by_key(|c| format!("{c:?}"));
            restrictions.dedup();
            ConsentDecision {
                allowed: true,
                consent_id: Some(consent.id.clone()),
                reason: "consent permits action".to_string(),
                provisions_applied: applied,
                restrictions,
            }
        } else {
            ConsentDecision {
                allowed: false,
                consent_id: Some(consent.id.clone()),
                reason: "no matching permit provision".to_string(),
                provisions_applied: applied,
                restrictions: Vec::new(),
            }
        }
    }
}

/// A provision applies when action, purpose, category, actor and period all
/// match. Empty lists are unrestricted.
fn provision_matches(
    provision: &ConsentProvision,
    action: &str,
    purpose: Purpose,
    actor: &str,
    categories: &[DataCategory],
    now: chrono::DateTime<Utc>,
) -> bool {
    if !provision.actions.is_empty() && !provision.actions.iter().any(|a| a == action) {
        return false;
    }
    if !provision.purposes.is_empty()
        && !provision.purposes.iter().any(|p| p == purpose.as_str())
    {
        return false;
    }
    if !provision.data_categories.is_empty() {
        let category_hit = categories
            .iter()
            .any(|c| provision.data_categories.contains(c))
            || provision.data_categories.contains(&DataCategory::General);
        if !category_hit {
            return false;
        }
    }
    if !provision.actors.is_empty() && !provision.actors.iter().any(|a| a == actor) {
        return false;
    }
    provision.in_period(now)
}
