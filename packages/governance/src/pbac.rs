//! Purpose-based access control.
//!
//! A policy matches when the caller's role, the resource type (with `*`
//! wildcard and prefix/suffix globs), the declared purpose and the action
//! all match and every side-condition holds. Policies are evaluated in
//! ascending priority order (lower = stronger); the first match decides.
//! No match defaults to deny.
//!
//! Denials are audited. An emergency-purpose read with the break-glass
//! flag set is granted past the policy set and audited CRITICAL.

use aegis_tenancy::{Principal, Purpose};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::audit::{AuditDraft, AuditCategory, AuditService, AuditSeverity};

/// CRUD + export actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    Create,
    Read,
    Update,
    Delete,
    Export,
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    Allow,
    Deny,
}

/// Declarative side-conditions. `Custom` names an evaluator registered on
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Caller tenant must equal the resource tenant
    SameTenant,
    /// Caller session must have passed MFA
    RequireMfa,
    /// Named predicate registered via `register_condition`
    Custom(String),
}

/// An access-control policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lower evaluates first (stronger)
    pub priority: i32,
    pub effect: PolicyEffect,
    /// Roles the policy applies to; `*` matches any
    pub roles: Vec<String>,
    /// Resource-type patterns; supports `*`, `prefix*`, `*suffix`
    pub resources: Vec<String>,
    pub purposes: Vec<Purpose>,
    pub actions: Vec<AccessAction>,
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A single evaluated access request.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub principal: Principal,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    /// Tenant the resource belongs to, when known (SameTenant input)
    pub resource_tenant_id: Option<String>,
    pub action: AccessAction,
    pub purpose: Purpose,
    pub purpose_detail: Option<String>,
    pub patient_id: Option<String>,
    pub ip_address: Option<String>,
    /// Break-glass flag asserted by the caller
    pub emergency: bool,
}

/// Result of evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub policy_id: Option<String>,
    pub reason: String,
    /// Set when the emergency override granted access
    pub emergency_override: bool,
}

type ConditionFn = Box<dyn Fn(&AccessRequest) -> bool + Send + Sync>;

/// The PBAC engine. Holds the policy set and renders decisions; denials and
/// emergency overrides are written to the injected audit service.
pub struct PbacEngine {
    policies: RwLock<Vec<Policy>>,
    custom_conditions: RwLock<HashMap<String, ConditionFn>>,
    audit: Arc<AuditService>,
}

impl PbacEngine {
    pub fn new(audit: Arc<AuditService>) -> Self {
        Self {
            policies: RwLock::new(Vec::new()),
            custom_conditions: RwLock::new(HashMap::new()),
            audit,
        }
    }

    /// Engine preloaded with the baseline healthcare policy set.
    pub fn with_default_policies(audit: Arc<AuditService>) -> Self {
        let engine = Self::new(audit);
        for policy in default_policies() {
            engine.register_policy(policy);
        }
        engine
    }

    /// Add a policy. The set is re-sorted by priority on every insert.
    pub fn register_policy(&self, policy: Policy) {
        let mut policies = self.policies.write();
        tracing::info!(policy_id = %policy.id, priority = policy.priority, "Policy registered");
        policies.push(policy);
        policies.sort_by_key(|p| p.priority);
    }

    /// Register a named custom condition evaluator.
    pub fn register_condition(
        &self,
        name: impl Into<String>,
        predicate: impl Fn(&AccessRequest) -> bool + Send + Sync + 'static,
    ) {
        self.custom_conditions
            .write()
            .insert(name.into(), Box::new(predicate));
    }

    /// Evaluate a request. First matching policy decides; absence of a
    /// match is a deny.
    pub fn evaluate(&self, request: &AccessRequest) -> AccessDecision {
        // Break-glass: emergency purpose + asserted flag grants read only
        if request.purpose == Purpose::Emergency
            && request.emergency
            && request.action == AccessAction::Read
        {
            self.audit.log(
                AuditDraft::new(
                    AuditCategory::BreakGlass,
                    "emergency_access",
                    &request.principal.user_id,
                    &request.tenant_id,
                    &request.resource_type,
                    &request.resource_id,
                )
                .purpose(request.purpose.as_str())
                .severity(AuditSeverity::Critical)
                .metadata(serde_json::json!({
                    "detail": request.purpose_detail,
                })),
            );
            return AccessDecision {
                allowed: true,
                policy_id: None,
                reason: "emergency access override".to_string(),
                emergency_override: true,
            };
        }

        let policies = self.policies.read();
        for policy in policies.iter().filter(|p| p.enabled) {
            if self.policy_matches(policy, request) {
                let allowed = policy.effect == PolicyEffect::Allow;
                let decision = AccessDecision {
                    allowed,
                    policy_id: Some(policy.id.clone()),
                    reason: format!("matched policy '{}'", policy.name),
                    emergency_override: false,
                };
                if !allowed {
                    self.audit_denied(request, &decision.reason);
                }
                tracing::debug!(
                    policy_id = %policy.id,
                    allowed,
                    resource_type = %request.resource_type,
                    action = ?request.action,
                    "Access evaluated"
                );
                return decision;
            }
        }

        let decision = AccessDecision {
            allowed: false,
            policy_id: None,
            reason: "no matching policy, default deny".to_string(),
            emergency_override: false,
        };
        self.audit_denied(request, &decision.reason);
        decision
    }

    fn audit_denied(&self, request: &AccessRequest, reason: &str) {
        self.audit.log_denied(
            &request.principal.user_id,
            &request.resource_type,
            &request.resource_id,
            &request.tenant_id,
            reason,
        );
    }

    fn policy_matches(&self, policy: &Policy, request: &AccessRequest) -> bool {
        let role_match = policy.roles.iter().any(|role| {
            role == "*" || request.principal.has_role(role)
        });
        if !role_match {
            return false;
        }
        if !policy
            .resources
            .iter()
            .any(|pattern| glob_match(pattern, &request.resource_type))
        {
            return false;
        }
        if !policy.purposes.contains(&request.purpose) {
            return false;
        }
        if !policy.actions.contains(&request.action) {
            return false;
        }
        policy
            .conditions
            .iter()
            .all(|condition| self.condition_holds(condition, request))
    }

    fn condition_holds(&self, condition: &PolicyCondition, request: &AccessRequest) -> bool {
        match condition {
            PolicyCondition::SameTenant => request
                .resource_tenant_id
                .as_deref()
                .map(|t| t == request.tenant_id)
                .unwrap_or(true),
            PolicyCondition::RequireMfa => request.principal.mfa_verified,
            PolicyCondition::Custom(name) => self
                .custom_conditions
                .read()
                .get(name)
                .map(|predicate| predicate(request))
                // An unregistered evaluator must fail closed
                .unwrap_or(false),
        }
    }
}

/// `*`, `prefix*` and `*suffix` glob matching.
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    pattern == value
}

/// Baseline healthcare policy set: clinicians read clinical data for
/// treatment, billing works claims/coverage for payment, researchers read
/// de-identified categories, sensitive exports require MFA.
fn default_policies() -> Vec<Policy> {
    vec![
        Policy {
            id: "clinical-read".into(),
            name: "Clinical read for treatment".into(),
            description: "Physicians and nurses read clinical records for treatment".into(),
            priority: 100,
            effect: PolicyEffect::Allow,
            roles: vec!["physician".into(), "nurse".into()],
            resources: vec![
                "Patient".into(),
                "Encounter".into(),
                "Condition".into(),
                "Observation".into(),
                "MedicationRequest".into(),
                "Procedure".into(),
            ],
            purposes: vec![Purpose::Treatment],
            actions: vec![AccessAction::Read],
            conditions: vec![PolicyCondition::SameTenant],
            enabled: true,
        },
        Policy {
            id: "billing-claims".into(),
            name: "Billing works claims".into(),
            description: "Billing staff read and update financial records for payment".into(),
            priority: 100,
            effect: PolicyEffect::Allow,
            roles: vec!["billing".into()],
            resources: vec!["Claim*".into(), "Coverage".into(), "Denial".into()],
            purposes: vec![Purpose::Payment, Purpose::Operations],
            actions: vec![AccessAction::Read, AccessAction::Update],
            conditions: vec![PolicyCondition::SameTenant],
            enabled: true,
        },
        Policy {
            id: "research-read".into(),
            name: "Research read".into(),
            description: "Researchers read observations and conditions".into(),
            priority: 200,
            effect: PolicyEffect::Allow,
            roles: vec!["researcher".into()],
            resources: vec!["Observation".into(), "Condition".into()],
            purposes: vec![Purpose::Research, Purpose::QualityImprovement],
            actions: vec![AccessAction::Read],
            conditions: vec![PolicyCondition::SameTenant],
            enabled: true,
        },
        Policy {
            id: "export-requires-mfa".into(),
            name: "Exports require MFA".into(),
            description: "Any export of any resource requires an MFA-verified session".into(),
            priority: 10,
            effect: PolicyEffect::Deny,
            roles: vec!["*".into()],
            resources: vec!["*".into()],
            purposes: Purpose::ALL.to_vec(),
            actions: vec![AccessAction::Export],
            conditions: vec![PolicyCondition::Custom("mfa_missing".into())],
            enabled: true,
        },
        Policy {
            id: "system-full".into(),
            name: "Platform internal access".into(),
            description: "The system principal operates pipelines and sweeps".into(),
            priority: 300,
            effect: PolicyEffect::Allow,
            roles: vec!["system".into()],
            resources: vec!["*".into()],
            purposes: Purpose::ALL.to_vec(),
            actions: vec![
                AccessAction::Create,
                AccessAction::Read,
                AccessAction::Update,
                AccessAction::Delete,
            ],
            conditions: vec![PolicyCondition::SameTenant],
            enabled: true,
        },
    ]
}
