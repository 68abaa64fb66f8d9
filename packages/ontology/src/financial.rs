//! Financial entities: claims, claim lines, denials, coverage and prior
//! authorizations.
//!
//! Amounts are plain `f64` dollars as parsed from X12 monetary elements.
//! CARC group/reason codes are classified onto a fixed denial taxonomy so
//! downstream analytics never branch on raw payer codes.

use serde::{Deserialize, Serialize};

/// Claim form type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Professional,
    Institutional,
    Dental,
    Pharmacy,
}

/// Claim lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Pending,
    Paid,
    Denied,
    Appealed,
    Adjusted,
}

/// A healthcare claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_number: Option<String>,
    pub patient_id: Option<String>,
    pub encounter_id: Option<String>,
    pub payer_id: Option<String>,
    pub claim_type: Option<ClaimType>,
    pub status: Option<ClaimStatus>,
    pub service_date_start: Option<String>,
    pub service_date_end: Option<String>,
    pub billed_amount: Option<f64>,
    pub allowed_amount: Option<f64>,
    pub paid_amount: Option<f64>,
    pub patient_responsibility: Option<f64>,
    pub primary_diagnosis: Option<String>,
    #[serde(default)]
    pub secondary_diagnoses: Vec<String>,
    pub facility_code: Option<String>,
}

/// A service line on a claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub claim_id: Option<String>,
    pub line_number: u32,
    pub procedure_code: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub units: u32,
    pub service_date: Option<String>,
    pub place_of_service: Option<String>,
    pub billed_amount: Option<f64>,
    pub allowed_amount: Option<f64>,
    pub paid_amount: Option<f64>,
}

/// Denial category taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCategory {
    Eligibility,
    Authorization,
    MedicalNecessity,
    Coding,
    TimelyFiling,
    Duplicate,
    Bundling,
    Documentation,
    Contract,
    Other,
}

impl DenialCategory {
    /// Classify a CARC reason code onto the taxonomy.
    ///
    /// Covers the high-volume codes; anything unrecognized lands in `Other`
    /// and keeps its raw code on the record.
    pub fn from_carc(reason_code: &str) -> Self {
        match reason_code {
            "26" | "27" | "31" | "32" | "33" | "200" => Self::Eligibility,
            "15" | "39" | "197" | "198" => Self::Authorization,
            "50" | "55" | "56" | "167" => Self::MedicalNecessity,
            "4" | "11" | "16" | "146" | "181" | "182" => Self::Coding,
            "29" => Self::TimelyFiling,
            "18" => Self::Duplicate,
            "97" | "234" | "236" => Self::Bundling,
            "251" | "252" => Self::Documentation,
            "45" | "59" | "94" => Self::Contract,
            _ => Self::Other,
        }
    }
}

/// A claim denial received on remittance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Denial {
    pub claim_id: Option<String>,
    /// CARC or RARC code as received (e.g. `CO-197`)
    pub reason_code: Option<String>,
    /// Which code list the reason comes from
    pub code_type: Option<String>,
    pub category: Option<DenialCategory>,
    pub description: Option<String>,
    pub denied_amount: Option<f64>,
    pub denial_date: Option<String>,
    pub appeal_deadline: Option<String>,
    pub status: Option<String>,
}

/// Patient insurance coverage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub patient_id: Option<String>,
    pub payer_id: Option<String>,
    pub payer_name: Option<String>,
    pub member_id: Option<String>,
    pub plan_id: Option<String>,
    pub group_number: Option<String>,
    /// Coverage order: primary, secondary, tertiary
    pub coverage_type: Option<String>,
    pub effective_date: Option<String>,
    pub termination_date: Option<String>,
}

/// Prior-authorization decision status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Requested,
    Approved,
    Denied,
    Pending,
    Expired,
    Cancelled,
}

impl AuthorizationStatus {
    /// Map an X12 278 HCR action code to a decision status.
    pub fn from_hcr_action(code: &str) -> Self {
        match code {
            "A1" | "A2" => Self::Approved,
            "A3" => Self::Denied,
            "A4" => Self::Pending,
            "A6" => Self::Cancelled,
            _ => Self::Requested,
        }
    }
}

/// Prior authorization for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub patient_id: Option<String>,
    pub authorization_number: Option<String>,
    #[serde(default)]
    pub service_codes: Vec<String>,
    pub status: Option<AuthorizationStatus>,
    pub effective_date: Option<String>,
    pub expiry_date: Option<String>,
    pub payer_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carc_classification() {
        assert_eq!(DenialCategory::from_carc("197"), DenialCategory::Authorization);
        assert_eq!(DenialCategory::from_carc("50"), DenialCategory::MedicalNecessity);
        assert_eq!(DenialCategory::from_carc("29"), DenialCategory::TimelyFiling);
        assert_eq!(DenialCategory::from_carc("18"), DenialCategory::Duplicate);
        assert_eq!(DenialCategory::from_carc("9999"), DenialCategory::Other);
    }

    #[test]
    fn test_hcr_action_mapping() {
        assert_eq!(
            AuthorizationStatus::from_hcr_action("A1"),
            AuthorizationStatus::Approved
        );
        assert_eq!(
            AuthorizationStatus::from_hcr_action("A2"),
            AuthorizationStatus::Approved
        );
        assert_eq!(
            AuthorizationStatus::from_hcr_action("A3"),
            AuthorizationStatus::Denied
        );
        assert_eq!(
            AuthorizationStatus::from_hcr_action("A4"),
            AuthorizationStatus::Pending
        );
        assert_eq!(
            AuthorizationStatus::from_hcr_action("A6"),
            AuthorizationStatus::Cancelled
        );
    }

    #[test]
    fn test_denial_serde_category() {
        let denial = Denial {
            category: Some(DenialCategory::MedicalNecessity),
            ..Default::default()
        };
        let json = serde_json::to_value(&denial).unwrap();
        assert_eq!(json["category"], "medical_necessity");
    }
}
