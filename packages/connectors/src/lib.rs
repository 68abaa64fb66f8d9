//! Aegis-Connectors: Unified Ingestion Connectors
//!
//! Format-specific parsers for the ingestion pipeline. Every connector
//! implements the same contract — `validate(payload)` and
//! `parse(payload) → {vertices, edges, errors, warnings}` — and the
//! registry dispatches on [`SourceType`] with no reflection.
//!
//! Formats:
//! - FHIR R4 bundles ([`fhir`])
//! - HL7v2 ADT/ORU messages ([`hl7v2`])
//! - C-CDA clinical documents ([`cda`])
//! - X12 EDI 837/835/270/278 ([`x12`])
//! - DICOM JSON metadata ([`dicom`])
//! - PRO / SDOH questionnaire responses ([`pro_sdoh`])
//! - Wearable device samples ([`wearables`])
//! - Consent documents ([`consent_docs`])
//!
//! Connectors never abort a payload for one bad record: per-record problems
//! land in `errors[]`/`warnings[]` and parsing continues. Only a malformed
//! root payload yields `success = false`.

pub mod cda;
pub mod consent_docs;
pub mod dicom;
pub mod fhir;
pub mod hl7v2;
pub mod pro_sdoh;
pub mod registry;
pub mod sdk;
pub mod wearables;
pub mod x12;

pub use registry::ConnectorRegistry;
pub use sdk::{Connector, IngestScope, ParseOutcome, SourceType};
