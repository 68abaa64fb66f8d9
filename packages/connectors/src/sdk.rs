//! Connector SDK — the contract every format connector implements.

use aegis_ontology::{Edge, Vertex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Supported source types for unified ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    FhirR4,
    Hl7v2,
    Ccda,
    X12_837,
    X12_835,
    X12_270,
    X12_278,
    Dicom,
    Pro,
    Sdoh,
    Consent,
    Wearables,
}

impl SourceType {
    /// Wire name, also the topic prefix (`<type>.raw` / `.validated` / `.dlq`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FhirR4 => "fhir_r4",
            Self::Hl7v2 => "hl7v2",
            Self::Ccda => "ccda",
            Self::X12_837 => "x12_837",
            Self::X12_835 => "x12_835",
            Self::X12_270 => "x12_270",
            Self::X12_278 => "x12_278",
            Self::Dicom => "dicom",
            Self::Pro => "pro",
            Self::Sdoh => "sdoh",
            Self::Consent => "consent",
            Self::Wearables => "wearables",
        }
    }

    pub const ALL: [SourceType; 12] = [
        Self::FhirR4,
        Self::Hl7v2,
        Self::Ccda,
        Self::X12_837,
        Self::X12_835,
        Self::X12_270,
        Self::X12_278,
        Self::Dicom,
        Self::Pro,
        Self::Sdoh,
        Self::Consent,
        Self::Wearables,
    ];
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown source type: {s}"))
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant/source scope a parse runs under. Every emitted vertex and edge is
/// tagged with these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestScope {
    pub tenant_id: String,
    pub source_system: String,
}

impl IngestScope {
    pub fn new(tenant_id: impl Into<String>, source_system: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            source_system: source_system.into(),
        }
    }
}

/// Result of one connector parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub success: bool,
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ParseOutcome {
    /// Empty successful outcome to accumulate into.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// Terminal failure for a malformed root payload.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    pub fn push_vertex(&mut self, vertex: Vertex) {
        self.vertices.push(vertex);
    }

    pub fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

/// The connector contract. Connectors are pure parsers: recoverable data
/// issues go into the outcome, never a panic or an Err.
pub trait Connector: Send + Sync {
    /// Which source type this connector handles.
    fn connector_type(&self) -> SourceType;

    /// Structural validation without a full parse. Empty means valid.
    fn validate(&self, payload: &str) -> Vec<String>;

    /// Parse and transform a payload into graph records.
    fn parse(&self, payload: &str, scope: &IngestScope) -> ParseOutcome;
}

/// `YYYYMMDD[HHMMSS]` → ISO-8601. A bare `YYYYMM` or `YYYY` is padded for
/// birth dates (missing day is not an error there); anything shorter than 4
/// digits is passed back unchanged.
pub fn format_compact_date(raw: &str) -> Option<String> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        0..=3 => {
            if raw.trim().is_empty() {
                None
            } else {
                Some(raw.trim().to_string())
            }
        }
        4..=5 => Some(format!("{}-01-01", &digits[..4])),
        6..=7 => Some(format!("{}-{}-01", &digits[..4], &digits[4..6])),
        8..=13 => Some(format!(
            "{}-{}-{}",
            &digits[..4],
            &digits[4..6],
            &digits[6..8]
        )),
        _ => Some(format!(
            "{}-{}-{}T{}:{}:{}Z",
            &digits[..4],
            &digits[4..6],
            &digits[6..8],
            &digits[8..10],
            &digits[10..12],
            &digits[12..14]
        )),
    }
}
