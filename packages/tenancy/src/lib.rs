//! Aegis-Tenancy: Request Context Propagation
//!
//! Every request or task carries an explicit [`RequestContext`] with tenant,
//! principal, declared purpose, request id and an optional deadline. The
//! context is threaded through call paths as a value; there are no hidden
//! globals, so task boundaries propagate it explicitly.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_tenancy::{Principal, Purpose, RequestContext};
//!
//! let ctx = RequestContext::new("hospital-a", Purpose::Treatment)
//!     .with_principal(Principal::user("u-1", "dr@example.org", ["physician"]));
//! assert_eq!(ctx.tenant_id, "hospital-a");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Tenancy errors.
#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("invalid purpose: {0}")]
    InvalidPurpose(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Healthcare data access purposes (HIPAA purpose-of-use).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Treatment,
    Payment,
    Operations,
    Research,
    PublicHealth,
    QualityImprovement,
    Audit,
    Emergency,
}

impl Purpose {
    /// Wire value, as carried in the `X-Purpose` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Treatment => "treatment",
            Self::Payment => "payment",
            Self::Operations => "operations",
            Self::Research => "research",
            Self::PublicHealth => "public_health",
            Self::QualityImprovement => "quality_improvement",
            Self::Audit => "audit",
            Self::Emergency => "emergency",
        }
    }

    /// All valid purposes, for validation messages.
    pub const ALL: [Purpose; 8] = [
        Self::Treatment,
        Self::Payment,
        Self::Operations,
        Self::Research,
        Self::PublicHealth,
        Self::QualityImprovement,
        Self::Audit,
        Self::Emergency,
    ];
}

impl FromStr for Purpose {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "treatment" => Ok(Self::Treatment),
            "payment" => Ok(Self::Payment),
            "operations" => Ok(Self::Operations),
            "research" => Ok(Self::Research),
            "public_health" => Ok(Self::PublicHealth),
            "quality_improvement" => Ok(Self::QualityImprovement),
            "audit" => Ok(Self::Audit),
            "emergency" => Ok(Self::Emergency),
            other => Err(TenancyError::InvalidPurpose(other.to_string())),
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller, as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the session passed MFA (policy side-condition input)
    #[serde(default)]
    pub mfa_verified: bool,
}

impl Principal {
    /// A human user principal.
    pub fn user(
        user_id: impl Into<String>,
        email: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: Some(email.into()),
            roles: roles.into_iter().map(Into::into).collect(),
            mfa_verified: false,
        }
    }

    /// The platform itself acting on its own behalf (pipelines, sweeps).
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            email: None,
            roles: vec!["system".to_string()],
            mfa_verified: true,
        }
    }

    pub fn with_mfa(mut self) -> Self {
        self.mfa_verified = true;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Ambient per-request context, propagated explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: String,
    pub principal: Principal,
    pub purpose: Purpose,
    /// Free-text elaboration of the purpose (e.g. break-glass justification)
    pub purpose_detail: Option<String>,
    pub request_id: String,
    pub ip_address: Option<String>,
    /// Absolute deadline for outbound work on this request
    pub deadline: Option<DateTime<Utc>>,
    /// Emergency override flag (break-glass)
    #[serde(default)]
    pub emergency: bool,
}

impl RequestContext {
    /// New context with a generated request id and the system principal.
    pub fn new(tenant_id: impl Into<String>, purpose: Purpose) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            principal: Principal::system(),
            purpose,
            purpose_detail: None,
            request_id: Uuid::new_v4().to_string(),
            ip_address: None,
            deadline: None,
            emergency: false,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_purpose_detail(mut self, detail: impl Into<String>) -> Self {
        self.purpose_detail = Some(detail.into());
        self
    }

    pub fn emergency(mut self) -> Self {
        self.emergency = true;
        self
    }

    /// Remaining time before the deadline, if one is set.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.deadline.map(|d| d - now)
    }

    /// Err if the deadline has passed.
    pub fn check_deadline(&self, now: DateTime<Utc>) -> Result<(), TenancyError> {
        match self.deadline {
            Some(d) if now >= d => Err(TenancyError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
