//! X12 EDI connectors.
//!
//! A shared segment parser ([`parser`]) detects separators from the ISA
//! envelope; transaction-specific connectors transform 837 claims, 835
//! remittances, 270 eligibility inquiries and 278 prior authorizations.

pub mod claims;
pub mod eligibility;
pub mod parser;
pub mod prior_auth;
pub mod remittance;

pub use claims::X12ClaimConnector;
pub use eligibility::X12EligibilityConnector;
pub use parser::{X12Document, X12Segment};
pub use prior_auth::X12PriorAuthConnector;
pub use remittance::X12RemittanceConnector;
