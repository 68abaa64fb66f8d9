//! Clinical entities: demographics, encounters, diagnoses, observations,
//! medications, procedures and clinical documents.
//!
//! Field sets follow FHIR R4 naming where a resource exists, flattened to
//! graph-property-friendly shapes. All timestamps are ISO-8601 strings as
//! received from the source; `DateTime<Utc>` is reserved for platform-owned
//! timestamps.

use serde::{Deserialize, Serialize};

/// Administrative gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    /// Map an HL7v2 administrative-sex code (`PID-8`).
    pub fn from_hl7(code: &str) -> Self {
        match code {
            "M" => Self::Male,
            "F" => Self::Female,
            "O" => Self::Other,
            _ => Self::Unknown,
        }
    }

    /// Map a FHIR `Patient.gender` value.
    pub fn from_fhir(value: &str) -> Self {
        match value {
            "male" => Self::Male,
            "female" => Self::Female,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

/// Patient demographics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub mrn: Option<String>,
    pub family_name: Option<String>,
    pub given_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
    #[serde(default)]
    pub deceased: bool,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Patient {
    /// Display name, given-first.
    pub fn display_name(&self) -> String {
        let given = self.given_name.as_deref().unwrap_or("");
        let family = self.family_name.as_deref().unwrap_or("");
        format!("{given} {family}").trim().to_string()
    }
}

/// Encounter class (setting of care).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterClass {
    Inpatient,
    Outpatient,
    Emergency,
}

impl EncounterClass {
    /// Map an HL7v2 patient-class code (`PV1-2`).
    pub fn from_hl7(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Inpatient),
            "O" => Some(Self::Outpatient),
            "E" => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// Encounter lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncounterStatus {
    #[serde(rename = "planned")]
    Planned,
    #[serde(rename = "arrived")]
    Arrived,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "unknown")]
    Unknown,
}

impl EncounterStatus {
    /// Status implied by an ADT trigger event (`MSH-9.2`).
    /// A01/A04 open an encounter, A03 closes it, A08 is an update with no
    /// status transition of its own.
    pub fn from_adt_trigger(trigger: &str) -> Self {
        match trigger {
            "A01" | "A04" => Self::InProgress,
            "A03" => Self::Finished,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Arrived => "arrived",
            Self::InProgress => "in-progress",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

/// A patient visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub patient_id: Option<String>,
    pub visit_number: Option<String>,
    pub encounter_class: Option<EncounterClass>,
    pub status: Option<EncounterStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub provider_ref: Option<String>,
    pub reason: Option<String>,
}

/// Diagnosis / problem-list entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub patient_id: Option<String>,
    pub code: Option<String>,
    pub code_system: Option<String>,
    pub display: Option<String>,
    pub clinical_status: Option<String>,
    pub onset_date: Option<String>,
    pub encounter_id: Option<String>,
}

/// Observation value: numeric, textual or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Numeric(f64),
    Boolean(bool),
    Text(String),
}

/// Lab result or vital sign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub patient_id: Option<String>,
    pub code: Option<String>,
    pub code_system: Option<String>,
    pub display: Option<String>,
    pub value: Option<ObservationValue>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal_flag: Option<String>,
    pub effective_date: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub encounter_id: Option<String>,
}

impl Observation {
    /// Numeric value, if the observation carries one.
    pub fn numeric(&self) -> Option<f64> {
        match self.value {
            Some(ObservationValue::Numeric(v)) => Some(v),
            _ => None,
        }
    }
}

/// Medication order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicationRequest {
    pub patient_id: Option<String>,
    pub code: Option<String>,
    pub code_system: Option<String>,
    pub display: Option<String>,
    pub dosage: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Performed procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub patient_id: Option<String>,
    pub code: Option<String>,
    pub code_system: Option<String>,
    pub display: Option<String>,
    pub performed_date: Option<String>,
    pub performer_id: Option<String>,
}

/// Parsed clinical document (C-CDA) header plus the structured entries its
/// coded sections yield.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub document_type: Option<String>,
    pub title: Option<String>,
    pub effective_date: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub author_name: Option<String>,
    pub custodian: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_maps() {
        assert_eq!(Gender::from_hl7("M"), Gender::Male);
        assert_eq!(Gender::from_hl7("F"), Gender::Female);
        assert_eq!(Gender::from_hl7("X"), Gender::Unknown);
        assert_eq!(Gender::from_fhir("female"), Gender::Female);
    }

    #[test]
    fn test_adt_trigger_status() {
        assert_eq!(
            EncounterStatus::from_adt_trigger("A01"),
            EncounterStatus::InProgress
        );
        assert_eq!(
            EncounterStatus::from_adt_trigger("A04"),
            EncounterStatus::InProgress
        );
        assert_eq!(
            EncounterStatus::from_adt_trigger("A03"),
            EncounterStatus::Finished
        );
        assert_eq!(
            EncounterStatus::from_adt_trigger("A08"),
            EncounterStatus::Unknown
        );
    }

    #[test]
    fn test_encounter_status_wire_value() {
        let json = serde_json::to_string(&EncounterStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn test_observation_numeric() {
        let obs = Observation {
            value: Some(ObservationValue::Numeric(98.6)),
            ..Default::default()
        };
        assert_eq!(obs.numeric(), Some(98.6));

        let text = Observation {
            value: Some(ObservationValue::Text("negative".into())),
            ..Default::default()
        };
        assert_eq!(text.numeric(), None);
    }
}
