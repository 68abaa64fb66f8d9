//! DICOM JSON metadata connector.
//!
//! Accepts standard DICOM JSON (`{"0020000D": {"vr": "UI", "Value": [..]}}`)
//! for a single instance or an array of instances. StudyInstanceUID
//! `[0020,000D]` is the primary key; instances group into series by
//! `[0020,000E]`. Pixel data is out of scope, metadata only.

use aegis_ontology::Vertex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::sdk::{format_compact_date, Connector, IngestScope, ParseOutcome, SourceType};

const TAG_STUDY_UID: &str = "0020000D";
const TAG_SERIES_UID: &str = "0020000E";
const TAG_MODALITY: &str = "00080060";
const TAG_STUDY_DATE: &str = "00080020";
const TAG_STUDY_DESC: &str = "00081030";
const TAG_SERIES_DESC: &str = "0008103E";
const TAG_ACCESSION: &str = "00080050";
const TAG_PATIENT_ID: &str = "00100020";
const TAG_INSTITUTION: &str = "00080080";

/// DICOM JSON connector.
pub struct DicomConnector;

impl Connector for DicomConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::Dicom
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        match serde_json::from_str::<Value>(payload) {
            Ok(root) => {
                if instances_of(&root).iter().any(|i| tag_str(i, TAG_STUDY_UID).is_some()) {
                    Vec::new()
                } else {
                    vec!["missing StudyInstanceUID [0020,000D]".to_string()]
                }
            }
            Err(e) => vec![format!("invalid JSON: {e}")],
        }
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let root: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::failure(format!("invalid JSON: {e}")),
        };
        let instances = instances_of(&root);
        if instances.is_empty() {
            return ParseOutcome::failure("no DICOM instances in payload");
        }

        let mut outcome = ParseOutcome::ok();
        let Some(first_with_study) = instances
            .iter()
            .find(|i| tag_str(i, TAG_STUDY_UID).is_some())
        else {
            return ParseOutcome::failure("missing StudyInstanceUID [0020,000D]");
        };
        let study_uid = tag_str(first_with_study, TAG_STUDY_UID).unwrap_or_default();

        // Group instances into series
        let mut series: BTreeMap<String, (usize, Option<String>, Option<String>)> =
            BTreeMap::new();
        let mut modalities: Vec<String> = Vec::new();
        for instance in &instances {
            if tag_str(instance, TAG_STUDY_UID).as_deref() != Some(&study_uid) {
                outcome.warn("instance belongs to a different study, skipped".to_string());
                continue;
            }
            let series_uid = tag_str(instance, TAG_SERIES_UID).unwrap_or_default();
            let modality = tag_str(instance, TAG_MODALITY);
            if let Some(m) = &modality {
                if !modalities.contains(m) {
                    modalities.push(m.clone());
                }
            }
            let entry = series.entry(series_uid).or_insert((0, None, None));
            entry.0 += 1;
            if entry.1.is_none() {
                entry.1 = modality;
            }
            if entry.2.is_none() {
                entry.2 = tag_str(instance, TAG_SERIES_DESC);
            }
        }

        let series_summaries: Vec<Value> = series
            .iter()
            .filter(|(uid, _)| !uid.is_empty())
            .map(|(uid, (count, modality, description))| {
                serde_json::json!({
                    "series_instance_uid": uid,
                    "instance_count": count,
                    "modality": modality,
                    "series_description": description,
                })
            })
            .collect();

        let study = Vertex::new("ImagingStudy", &study_uid, &scope.tenant_id, &scope.source_system)
            .with_prop("study_instance_uid", study_uid.as_str())
            .with_opt_prop(
                "study_date",
                tag_str(first_with_study, TAG_STUDY_DATE)
                    .as_deref()
                    .and_then(format_compact_date),
            )
            .with_opt_prop("study_description", tag_str(first_with_study, TAG_STUDY_DESC))
            .with_opt_prop("accession_number", tag_str(first_with_study, TAG_ACCESSION))
            .with_opt_prop("institution_name", tag_str(first_with_study, TAG_INSTITUTION))
            .with_opt_prop(
                "patient_id",
                tag_str(first_with_study, TAG_PATIENT_ID).map(|p| format!("Patient/{p}")),
            )
            .with_prop(
                "modalities",
                Value::Array(modalities.into_iter().map(Value::String).collect()),
            )
            .with_prop("series", Value::Array(series_summaries))
            .with_prop("instance_count", instances.len());

        outcome.push_vertex(study);
        outcome
    }
}

fn instances_of(root: &Value) -> Vec<&Value> {
    match root {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![root],
        _ => Vec::new(),
    }
}

/// Read a tag value: DICOM JSON `{"vr": ..., "Value": [v]}` or a flat value.
fn tag_str(instance: &Value, tag: &str) -> Option<String> {
    let entry = instance.get(tag)?;
    if let Some(wrapped) = entry.get("Value") {
        let first = wrapped.as_array()?.first()?;
        match first {
            Value::String(s) => Some(s.clone()),
            // PN values nest as {"Alphabetic": "..."}
            Value::Object(o) => o.get("Alphabetic")?.as_str().map(String::from),
            other => Some(other.to_string()),
        }
    } else {
        entry.as_str().map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(series: &str, modality: &str) -> Value {
        json!({
            "0020000D": {"vr": "UI", "Value": ["1.2.840.113619.2.1"]},
            "0020000E": {"vr": "UI", "Value": [series]},
            "00080060": {"vr": "CS", "Value": [modality]},
            "00080020": {"vr": "DA", "Value": ["20240310"]},
            "00081030": {"vr": "LO", "Value": ["CT CHEST W/O CONTRAST"]},
            "00100020": {"vr": "LO", "Value": ["X1"]},
        })
    }

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "pacs")
    }

    #[test]
    fn test_single_instance_study() {
        let payload = instance("1.2.3.1", "CT").to_string();
        let outcome = DicomConnector.parse(&payload, &scope());
        assert!(outcome.success);

        let study = &outcome.vertices[0];
        assert_eq!(study.id, "ImagingStudy/1.2.840.113619.2.1");
        assert_eq!(study.prop_str("study_date"), Some("2024-03-10"));
        assert_eq!(study.prop_str("patient_id"), Some("Patient/X1"));
        assert_eq!(study.properties.get("modalities").unwrap().as_array().unwrap()[0], "CT");
    }

    #[test]
    fn test_series_grouping() {
        let payload = json!([
            instance("1.2.3.1", "CT"),
            instance("1.2.3.1", "CT"),
            instance("1.2.3.2", "PT"),
        ])
        .to_string();

        let outcome = DicomConnector.parse(&payload, &scope());
        let study = &outcome.vertices[0];
        let series = study.properties.get("series").unwrap().as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(study.prop_f64("instance_count"), Some(3.0));

        let ct = series.iter().find(|s| s["series_instance_uid"] == "1.2.3.1").unwrap();
        assert_eq!(ct["instance_count"], 2);
    }

    #[test]
    fn test_missing_study_uid_fails() {
        let outcome = DicomConnector.parse(r#"{"00080060": "CT"}"#, &scope());
        assert!(!outcome.success);
        assert!(!DicomConnector.validate(r#"{"00080060": "CT"}"#).is_empty());
    }

    #[test]
    fn test_flat_tag_form() {
        let payload = json!({
            "0020000D": "9.8.7",
            "00080060": "MR"
        })
        .to_string();
        let outcome = DicomConnector.parse(&payload, &scope());
        assert_eq!(outcome.vertices[0].id, "ImagingStudy/9.8.7");
    }
}
