//! C-CDA clinical document connector.
//!
//! Streaming parse over the document XML. The LOINC section codes drive
//! structured extraction:
//! - `11450-4` problem list → Condition entries
//! - `10160-0` medication history → MedicationRequest entries
//! - `48765-2` allergies → AllergyIntolerance entries
//!
//! The document itself becomes a ClinicalDocument vertex; extracted entries
//! hang off it via `DOCUMENTS_CONDITION` / `_MEDICATION` / `_ALLERGY`.

use aegis_ontology::{Edge, EdgeKind, Vertex};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::sdk::{format_compact_date, Connector, IngestScope, ParseOutcome, SourceType};

const SECTION_PROBLEMS: &str = "11450-4";
const SECTION_MEDICATIONS: &str = "10160-0";
const SECTION_ALLERGIES: &str = "48765-2";

/// C-CDA connector.
pub struct CdaConnector;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SectionKind {
    Problems,
    Medications,
    Allergies,
}

#[derive(Debug, Clone)]
struct CodedEntry {
    code: String,
    code_system: Option<String>,
    display: Option<String>,
}

#[derive(Default)]
struct DocumentDraft {
    document_id: Option<String>,
    document_type: Option<String>,
    title: Option<String>,
    effective_date: Option<String>,
    patient_id: Option<String>,
    patient_given: Option<String>,
    patient_family: Option<String>,
    problems: Vec<CodedEntry>,
    medications: Vec<CodedEntry>,
    allergies: Vec<CodedEntry>,
}

impl Connector for CdaConnector {
    fn connector_type(&self) -> SourceType {
        SourceType::Ccda
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        let trimmed = payload.trim_start();
        if !trimmed.starts_with("<?xml") && !trimmed.starts_with('<') {
            return vec!["payload is not XML".to_string()];
        }
        if !payload.contains("ClinicalDocument") {
            return vec!["missing ClinicalDocument root".to_string()];
        }
        Vec::new()
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let draft = match parse_document(payload) {
            Ok(d) => d,
            Err(e) => return ParseOutcome::failure(format!("XML parse error: {e}")),
        };

        let mut outcome = ParseOutcome::ok();

        let document_natural_id = draft
            .document_id
            .clone()
            .unwrap_or_else(|| {
                outcome.warn("document has no id, using content hash".to_string());
                String::new()
            });
        let document = if document_natural_id.is_empty() {
            Vertex::content_addressed(
                "ClinicalDocument",
                payload,
                &scope.tenant_id,
                &scope.source_system,
            )
        } else {
            Vertex::new(
                "ClinicalDocument",
                &document_natural_id,
                &scope.tenant_id,
                &scope.source_system,
            )
        };

        let patient_vertex_id = draft.patient_id.as_deref().map(|p| format!("Patient/{p}"));
        let patient_name = match (&draft.patient_given, &draft.patient_family) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (Some(given), None) => Some(given.clone()),
            (None, Some(family)) => Some(family.clone()),
            (None, None) => None,
        };

        let document = document
            .with_opt_prop("document_type", draft.document_type.as_deref())
            .with_opt_prop("title", draft.title.as_deref())
            .with_opt_prop("effective_date", draft.effective_date.as_deref())
            .with_opt_prop("patient_id", patient_vertex_id.as_deref())
            .with_opt_prop("patient_name", patient_name.as_deref());
        let document_id = document.id.clone();
        outcome.push_vertex(document);

        let patient_natural = draft.patient_id.clone().unwrap_or_else(|| "unknown".into());
        let sections = [
            (&draft.problems, "Condition", EdgeKind::DocumentsCondition),
            (&draft.medications, "MedicationRequest", EdgeKind::DocumentsMedication),
            (&draft.allergies, "AllergyIntolerance", EdgeKind::DocumentsAllergy),
        ];
        for (entries, label, edge_kind) in sections {
            for entry in entries.iter() {
                let vertex = Vertex::new(
                    label,
                    format!("{patient_natural}-{}", entry.code),
                    &scope.tenant_id,
                    &scope.source_system,
                )
                .with_prop("code", entry.code.as_str())
                .with_opt_prop("code_system", entry.code_system.as_deref())
                .with_opt_prop("display", entry.display.as_deref())
                .with_opt_prop("patient_id", patient_vertex_id.as_deref());

                outcome.push_edge(Edge::new(
                    edge_kind,
                    "ClinicalDocument",
                    document_id.clone(),
                    label,
                    vertex.id.clone(),
                    scope.tenant_id.clone(),
                ));
                outcome.push_vertex(vertex);
            }
        }

        outcome.set_meta("problems", draft.problems.len());
        outcome.set_meta("medications", draft.medications.len());
        outcome.set_meta("allergies", draft.allergies.len());
        outcome
    }
}

fn attr(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn parse_document(payload: &str) -> Result<DocumentDraft, quick_xml::Error> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut draft = DocumentDraft::default();
    let mut path: Vec<String> = Vec::new();
    let mut current_section: Option<SectionKind> = None;
    let mut seen_root_code = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                path.push(name.clone());
                handle_element(
                    &e,
                    &name,
                    &path,
                    &mut draft,
                    &mut current_section,
                    &mut seen_root_code,
                );
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                path.push(name.clone());
                handle_element(
                    &e,
                    &name,
                    &path,
                    &mut draft,
                    &mut current_section,
                    &mut seen_root_code,
                );
                path.pop();
            }
            Event::Text(t) => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    match path.last().map(String::as_str) {
                        Some("title") if path.len() == 2 => draft.title = Some(text),
                        Some("given") if in_patient_name(&path) => {
                            draft.patient_given = Some(text)
                        }
                        Some("family") if in_patient_name(&path) => {
                            draft.patient_family = Some(text)
                        }
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "section" {
                    current_section = None;
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(draft)
}

fn in_patient_name(path: &[String]) -> bool {
    path.iter().any(|p| p == "patientRole") && path.iter().any(|p| p == "name")
}

fn handle_element(
    element: &BytesStart<'_>,
    name: &str,
    path: &[String],
    draft: &mut DocumentDraft,
    current_section: &mut Option<SectionKind>,
    seen_root_code: &mut bool,
) {
    let parent = path
        .len()
        .checked_sub(2)
        .and_then(|i| path.get(i))
        .map(String::as_str);

    match name {
        "id" => {
            if path.len() == 2 && draft.document_id.is_none() {
                let root = attr(element, "root").unwrap_or_default();
                let extension = attr(element, "extension").unwrap_or_default();
                let id = match (root.is_empty(), extension.is_empty()) {
                    (false, false) => format!("{root}.{extension}"),
                    (false, true) => root,
                    (true, false) => extension,
                    (true, true) => String::new(),
                };
                if !id.is_empty() {
                    draft.document_id = Some(id);
                }
            } else if parent == Some("patientRole") && draft.patient_id.is_none() {
                draft.patient_id = attr(element, "extension");
            }
        }
        "code" => {
            if path.len() == 2 && !*seen_root_code {
                *seen_root_code = true;
                draft.document_type = attr(element, "displayName").or_else(|| attr(element, "code"));
            } else if parent == Some("section") {
                *current_section = match attr(element, "code").as_deref() {
                    Some(SECTION_PROBLEMS) => Some(SectionKind::Problems),
                    Some(SECTION_MEDICATIONS) => Some(SectionKind::Medications),
                    Some(SECTION_ALLERGIES) => Some(SectionKind::Allergies),
                    _ => None,
                };
            } else if let Some(kind) = current_section {
                push_entry(draft, *kind, element);
            }
        }
        "value" => {
            // Problem observations carry the diagnosis in a CD-typed value
            if let Some(kind) = current_section {
                if attr(element, "code").is_some() {
                    push_entry(draft, *kind, element);
                }
            }
        }
        "effectiveTime" => {
            if path.len() == 2 && draft.effective_date.is_none() {
                draft.effective_date = attr(element, "value")
                    .as_deref()
                    .and_then(format_compact_date);
            }
        }
        _ => {}
    }
}

fn push_entry(draft: &mut DocumentDraft, kind: SectionKind, element: &BytesStart<'_>) {
    let Some(code) = attr(element, "code") else {
        return;
    };
    let entry = CodedEntry {
        code,
        code_system: attr(element, "codeSystemName").or_else(|| attr(element, "codeSystem")),
        display: attr(element, "displayName"),
    };
    let target = match kind {
        SectionKind::Problems => &mut draft.problems,
        SectionKind::Medications => &mut draft.medications,
        SectionKind::Allergies => &mut draft.allergies,
    };
    if !target.iter().any(|e| e.code == entry.code) {
        target.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CCDA: &str = r#"<?xml version="1.0"?>
<ClinicalDocument xmlns="urn:hl7-org:v3">
  <id root="2.16.840.1.113883.19.5" extension="DOC-42"/>
  <code code="34133-9" displayName="Summarization of Episode Note"/>
  <title>Continuity of Care Document</title>
  <effectiveTime value="20240301"/>
  <recordTarget>
    <patientRole>
      <id extension="X1" root="2.16.840.1.113883.19.5"/>
      <patient>
        <name><given>Marisol</given><family>Vega</family></name>
      </patient>
    </patientRole>
  </recordTarget>
  <component><structuredBody>
    <component><section>
      <code code="11450-4" codeSystem="2.16.840.1.113883.6.1" displayName="Problem List"/>
      <entry><act><entryRelationship><observation>
        <value code="I50.9" codeSystemName="ICD-10" displayName="Heart failure, unspecified"/>
      </observation></entryRelationship></act></entry>
    </section></component>
    <component><section>
      <code code="10160-0" codeSystem="2.16.840.1.113883.6.1" displayName="Medications"/>
      <entry><substanceAdministration><consumable><manufacturedProduct><manufacturedMaterial>
        <code code="197361" codeSystemName="RxNorm" displayName="Lisinopril 10 MG Oral Tablet"/>
      </manufacturedMaterial></manufacturedProduct></consumable></substanceAdministration></entry>
    </section></component>
    <component><section>
      <code code="48765-2" codeSystem="2.16.840.1.113883.6.1" displayName="Allergies"/>
      <entry><act><entryRelationship><observation>
        <value code="7980" codeSystemName="RxNorm" displayName="Penicillin"/>
      </observation></entryRelationship></act></entry>
    </section></component>
  </structuredBody></component>
</ClinicalDocument>"#;

    fn scope() -> IngestScope {
        IngestScope::new("tenant-a", "hie")
    }

    #[test]
    fn test_document_header() {
        let outcome = CdaConnector.parse(CCDA, &scope());
        assert!(outcome.success, "errors: {:?}", outcome.errors);

        let document = outcome
            .vertices
            .iter()
            .find(|v| v.label == "ClinicalDocument")
            .unwrap();
        assert_eq!(document.id, "ClinicalDocument/2.16.840.1.113883.19.5.DOC-42");
        assert_eq!(
            document.prop_str("document_type"),
            Some("Summarization of Episode Note")
        );
        assert_eq!(document.prop_str("title"), Some("Continuity of Care Document"));
        assert_eq!(document.prop_str("effective_date"), Some("2024-03-01"));
        assert_eq!(document.prop_str("patient_id"), Some("Patient/X1"));
        assert_eq!(document.prop_str("patient_name"), Some("Marisol Vega"));
    }

    #[test]
    fn test_section_extraction() {
        let outcome = CdaConnector.parse(CCDA, &scope());

        let condition = outcome.vertices.iter().find(|v| v.label == "Condition").unwrap();
        assert_eq!(condition.id, "Condition/X1-I50.9");
        assert_eq!(condition.prop_str("code_system"), Some("ICD-10"));

        let medication = outcome
            .vertices
            .iter()
            .find(|v| v.label == "MedicationRequest")
            .unwrap();
        assert_eq!(medication.prop_str("code"), Some("197361"));

        let allergy = outcome
            .vertices
            .iter()
            .find(|v| v.label == "AllergyIntolerance")
            .unwrap();
        assert_eq!(allergy.prop_str("display"), Some("Penicillin"));
    }

    #[test]
    fn test_document_edges() {
        let outcome = CdaConnector.parse(CCDA, &scope());
        for label in ["DOCUMENTS_CONDITION", "DOCUMENTS_MEDICATION", "DOCUMENTS_ALLERGY"] {
            let edge = outcome.edges.iter().find(|e| e.label == label).unwrap();
            assert!(edge.from_id.starts_with("ClinicalDocument/"), "{label}");
        }
    }

    #[test]
    fn test_malformed_xml_fails() {
        let outcome = CdaConnector.parse("<ClinicalDocument><unclosed", &scope());
        assert!(!outcome.success);
        assert!(!CdaConnector.validate("{}").is_empty());
        assert!(CdaConnector.validate(CCDA).is_empty());
    }
}
