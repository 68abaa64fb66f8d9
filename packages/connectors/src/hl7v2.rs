//! HL7v2 connector (ADT and ORU).
//!
//! Segment grammar: segments split on `\r`, fields on `|`, components on
//! `^`, first repetition of `~` taken. MSH is special-cased — MSH-1 is the
//! field separator itself, so its numbering is shifted by one relative to
//! the raw split.
//!
//! MSH-9.2 trigger codes drive encounter status: A01/A04 open an encounter
//! (`in-progress`), A03 closes it (`finished`), A08 is an update.

use aegis_ontology::{Edge, EdgeKind, EncounterClass, EncounterStatus, Gender, Vertex};

use crate::sdk::{format_compact_date, Connector, IngestScope, ParseOutcome, SourceType};

/// One parsed segment.
#[derive(Debug, Clone)]
pub struct Hl7Segment {
    pub id: String,
    parts: Vec<String>,
}

impl Hl7Segment {
    fn parse(line: &str) -> Option<Self> {
        let parts: Vec<String> = line.split('|').map(String::from).collect();
        let id = parts.first()?.clone();
        if id.len() != 3 {
            return None;
        }
        Some(Self { id, parts })
    }

    /// HL7-numbered field. For MSH, MSH-1 is `|` itself and numbering is
    /// shifted; for all other segments field N is the Nth split part.
    pub fn field(&self, n: usize) -> &str {
        let index = if self.id == "MSH" { n - 1 } else { n };
        self.parts
            .get(index)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Component `c` (1-based) of field `n`, first repetition.
    pub fn component(&self, n: usize, c: usize) -> &str {
        let field = self.field(n);
        let repetition = field.split('~').next().unwrap_or("");
        repetition.split('^').nth(c - 1).unwrap_or("")
    }
}

/// A parsed HL7v2 message.
#[derive(Debug, Clone)]
pub struct Hl7Message {
    pub segments: Vec<Hl7Segment>,
}

impl Hl7Message {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.replace('\n', "\r").replace("\r\r", "\r");
        if !normalized.starts_with("MSH") {
            return Err("message must start with MSH".to_string());
        }
        let segments: Vec<Hl7Segment> = normalized
            .split('\r')
            .filter(|line| !line.trim().is_empty())
            .filter_map(Hl7Segment::parse)
            .collect();
        if segments.is_empty() {
            return Err("no segments found".to_string());
        }
        Ok(Self { segments })
    }

    pub fn segment(&self, id: &str) -> Option<&Hl7Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn segments_named(&self, id: &str) -> Vec<&Hl7Segment> {
        self.segments.iter().filter(|s| s.id == id).collect()
    }
}

/// HL7v2 connector.
pub struct Hl7v2Connector;

impl Connector for Hl7v2Connector {
    fn connector_type(&self) -> SourceType {
        SourceType::Hl7v2
    }

    fn validate(&self, payload: &str) -> Vec<String> {
        match Hl7Message::parse(payload) {
            Ok(message) => {
                let mut errors = Vec::new();
                if message.segment("MSH").is_none() {
                    errors.push("missing MSH segment".to_string());
                }
                errors
            }
            Err(e) => vec![e],
        }
    }

    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome {
        let message = match Hl7Message::parse(payload) {
            Ok(m) => m,
            Err(e) => return ParseOutcome::failure(e),
        };
        let Some(msh) = message.segment("MSH") else {
            return ParseOutcome::failure("missing MSH segment");
        };

        let message_type = msh.component(9, 1).to_string();
        let trigger = msh.component(9, 2).to_string();
        let control_id = msh.field(10).to_string();

        let mut outcome = ParseOutcome::ok();
        outcome.set_meta("message_type", message_type.clone());
        outcome.set_meta("trigger_event", trigger.clone());
        outcome.set_meta("message_control_id", control_id.clone());
        outcome.set_meta("sending_facility", msh.component(4, 1));

        let Some(pid) = message.segment("PID") else {
            outcome.record_error("PID segment missing".to_string());
            return outcome;
        };
        let patient_id = pid.component(3, 1).to_string();
        if patient_id.is_empty() {
            outcome.record_error("PID-3 patient identifier missing".to_string());
            return outcome;
        }

        let patient_vertex = transform_pid(pid, &patient_id, scope);
        let patient_vertex_id = patient_vertex.id.clone();
        outcome.push_vertex(patient_vertex);

        match message_type.as_str() {
            "ADT" => transform_adt(&message, &trigger, &patient_vertex_id, scope, &mut outcome),
            "ORU" => transform_oru(&message, &control_id, &patient_vertex_id, scope, &mut outcome),
            other => outcome.warn(format!("unhandled message type: {other}")),
        }

        outcome
    }
}

fn transform_pid(pid: &Hl7Segment, patient_id: &str, scope: &IngestScope) -> Vertex {
    let gender = Gender::from_hl7(pid.field(8));
    Vertex::new("Patient", patient_id, &scope.tenant_id, &scope.source_system)
        .with_prop("mrn", patient_id)
        .with_opt_prop("family_name", non_empty(pid.component(5, 1)))
        .with_opt_prop("given_name", non_empty(pid.component(5, 2)))
        .with_opt_prop("birth_date", format_compact_date(pid.field(7)))
        .with_prop("gender", serde_json::to_value(gender).unwrap_or_default())
        .with_opt_prop("city", non_empty(pid.component(11, 3)))
        .with_opt_prop("state", non_empty(pid.component(11, 4)))
        .with_opt_prop("postal_code", non_empty(pid.component(11, 5)))
        .with_opt_prop("phone", non_empty(pid.component(13, 1)))
}

fn transform_adt(
    message: &Hl7Message,
    trigger: &str,
    patient_vertex_id: &str,
    scope: &IngestScope,
    outcome: &mut ParseOutcome,
) {
    // Encounter from PV1
    if let Some(pv1) = message.segment("PV1") {
        let visit_number = pv1.component(19, 1);
        if !visit_number.is_empty() {
            let status = EncounterStatus::from_adt_trigger(trigger);
            let class = EncounterClass::from_hl7(pv1.field(2));
            let encounter = Vertex::new(
                "Encounter",
                visit_number,
                &scope.tenant_id,
                &scope.source_system,
            )
            .with_prop("visit_number", visit_number)
            .with_prop("status", status.as_str())
            .with_opt_prop(
                "encounter_class",
                class.map(|c| serde_json::to_value(c).unwrap_or_default()),
            )
            .with_opt_prop("location", non_empty(pv1.component(3, 1)))
            .with_opt_prop("start_date", format_compact_date(pv1.field(44)))
            .with_opt_prop("end_date", format_compact_date(pv1.field(45)))
            .with_prop("adt_event", adt_event_name(trigger));

            outcome.push_edge(Edge::new(
                EdgeKind::HasEncounter,
                "Patient",
                patient_vertex_id,
                "Encounter",
                encounter.id.clone(),
                scope.tenant_id.clone(),
            ));
            outcome.push_vertex(encounter);
        }
    }

    // Diagnoses from DG1
    let patient_natural = patient_vertex_id.trim_start_matches("Patient/");
    for dg1 in message.segments_named("DG1") {
        let code = dg1.component(3, 1);
        if code.is_empty() {
            continue;
        }
        let condition = Vertex::new(
            "Condition",
            format!("{patient_natural}-{code}"),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("code", code)
        .with_opt_prop("display", non_empty(dg1.component(3, 2)))
        .with_opt_prop("code_system", non_empty(dg1.component(3, 3)));

        outcome.push_edge(Edge::new(
            EdgeKind::HasCondition,
            "Patient",
            patient_vertex_id,
            "Condition",
            condition.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(condition);
    }

    // Insurance from IN1
    for in1 in message.segments_named("IN1") {
        let company_id = in1.component(3, 1);
        let company_name = in1.component(4, 1);
        if company_id.is_empty() && company_name.is_empty() {
            continue;
        }
        let plan = non_empty(in1.component(2, 1)).unwrap_or("unknown");
        let coverage = Vertex::new(
            "Coverage",
            format!("{patient_natural}-{plan}"),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_opt_prop("payer_id", non_empty(company_id))
        .with_opt_prop("payer_name", non_empty(company_name))
        .with_prop("plan_id", plan);

        outcome.push_edge(Edge::new(
            EdgeKind::HasCoverage,
            "Patient",
            patient_vertex_id,
            "Coverage",
            coverage.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(coverage);
    }
}

fn transform_oru(
    message: &Hl7Message,
    control_id: &str,
    patient_vertex_id: &str,
    scope: &IngestScope,
    outcome: &mut ParseOutcome,
) {
    for (index, obx) in message.segments_named("OBX").iter().enumerate() {
        let code = obx.component(3, 1);
        if code.is_empty() {
            outcome.warn(format!("OBX {index}: missing observation id"));
            continue;
        }
        let raw_value = obx.field(5);
        let mut observation = Vertex::new(
            "Observation",
            format!("{control_id}-{index}"),
            &scope.tenant_id,
            &scope.source_system,
        )
        .with_prop("code", code)
        .with_opt_prop("display", non_empty(obx.component(3, 2)))
        .with_opt_prop("unit", non_empty(obx.component(6, 1)))
        .with_opt_prop("reference_range", non_empty(obx.field(7)))
        .with_opt_prop("abnormal_flag", non_empty(obx.field(8)))
        .with_opt_prop("effective_date", format_compact_date(obx.field(14)));

        observation = match raw_value.parse::<f64>() {
            Ok(numeric) => observation.with_prop("value_numeric", numeric),
            Err(_) => observation.with_opt_prop("value_string", non_empty(raw_value)),
        };

        outcome.push_edge(Edge::new(
            EdgeKind::HasObservation,
            "Patient",
            patient_vertex_id,
            "Observation",
            observation.id.clone(),
            scope.tenant_id.clone(),
        ));
        outcome.push_vertex(observation);
    }
}

fn adt_event_name(trigger: &str) -> &'static str {
    match trigger {
        "A01" => "admit",
        "A02" => "transfer",
        "A03" => "discharge",
        "A04" => "register",
        "A08" => "update",
        _ => "unknown",
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}
