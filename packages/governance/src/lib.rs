//! Aegis-Governance: The Governance Plane
//!
//! Four controls every data path runs through:
//! - [`audit`] — append-only, hash-chained audit log with integrity
//!   verification and an out-of-band alert sink for break-glass events
//! - [`pbac`] — purpose-based access control over
//!   `(principal, resource, action, purpose)` with priority-ordered policies
//! - [`consent`] — per-patient provision evaluation with deny precedence
//! - [`retention`] — per-type TTLs with legal-hold override
//!
//! Services are constructed once at startup and injected; none of them
//! instantiate lazily in hot paths.

pub mod audit;
pub mod consent;
pub mod pbac;
pub mod retention;

pub use audit::{
    AlertSink, AuditCategory, AuditEntry, AuditQuery, AuditService, AuditSeverity,
    TracingAlertSink,
};
pub use consent::{ConsentDecision, ConsentEngine};
pub use pbac::{
    AccessAction, AccessDecision, AccessRequest, PbacEngine, Policy, PolicyCondition,
    PolicyEffect,
};
pub use retention::{
    RetentionAction, RetentionManager, RetentionPolicy, RetentionRecord, RetentionSweep,
};
