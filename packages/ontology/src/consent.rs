//! Consent entities.
//!
//! A consent is a set of permit/deny provisions scoped by action, purpose,
//! data category, actor and time window. Evaluation semantics (deny
//! precedence, TREATMENT fallback) live in the governance consent engine;
//! this module only defines the records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consent record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStatus {
    Draft,
    Proposed,
    Active,
    Rejected,
    Inactive,
    EnteredInError,
}

/// Provision effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionType {
    Permit,
    Deny,
}

/// Sensitive data categories a provision can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    General,
    MentalHealth,
    SubstanceUse,
    Hiv,
    Genetic,
    Reproductive,
    Demographics,
    Financial,
}

/// A single permit/deny provision inside a consent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentProvision {
    pub provision_type: Option<ProvisionType>,
    /// Actions covered (`read`, `export`, ...); empty covers all
    #[serde(default)]
    pub actions: Vec<String>,
    /// Purposes covered; empty covers all
    #[serde(default)]
    pub purposes: Vec<String>,
    #[serde(default)]
    pub data_categories: Vec<DataCategory>,
    /// Actors (user or org ids) the provision is limited to; empty covers all
    #[serde(default)]
    pub actors: Vec<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

impl ConsentProvision {
    /// Whether the provision window covers `now` (null bounds are open).
    pub fn in_period(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.period_start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.period_end {
            if now >= end {
                return false;
            }
        }
        true
    }
}

/// A patient consent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consent {
    pub id: String,
    pub patient_id: String,
    pub tenant_id: String,
    pub status: ConsentStatus,
    /// Purpose scope the consent covers (e.g. `treatment`, `research`)
    pub scope: String,
    pub date_time: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provisions: Vec<ConsentProvision>,
}

impl Consent {
    /// Whether the consent is ACTIVE and unexpired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}
