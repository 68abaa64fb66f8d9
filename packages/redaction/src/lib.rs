//! Aegis-Redaction: PHI Detection and Redaction
//!
//! Detects and removes protected health information from free text before
//! it reaches a log sink or an export. Detection is pattern-based (SSN,
//! phone, email, MRN, common date forms) with an optional NER engine
//! plugged in behind the same interface; overlapping matches are resolved
//! by keeping the longest.
//!
//! Redaction MUST be deterministic: the same input always yields the same
//! output.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_redaction::PhiRedactor;
//!
//! let redactor = PhiRedactor::new();
//! let safe = redactor.redact("call 555-867-5309 re MRN: 884422", "[REDACTED]");
//! assert_eq!(safe, "call [REDACTED] re [REDACTED]");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Kind of PHI detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiKind {
    Ssn,
    Phone,
    Email,
    Mrn,
    Date,
    Account,
    /// Produced by a NER engine (person names, locations)
    NamedEntity,
}

/// A detected PHI span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiEntity {
    pub kind: PhiKind,
    pub start: usize,
    pub end: usize,
}

impl PhiEntity {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn overlaps(&self, other: &PhiEntity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Optional entity-recognition engine for PHI the patterns cannot catch.
pub trait NerEngine: Send + Sync {
    fn detect(&self, text: &str) -> Vec<PhiEntity>;
}

static PATTERNS: Lazy<Vec<(PhiKind, Regex)>> = Lazy::new(|| {
    vec![
        (PhiKind::Ssn, Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            PhiKind::Phone,
            Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap(),
        ),
        (
            PhiKind::Email,
            Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
        ),
        (
            PhiKind::Mrn,
            Regex::new(r"(?i)\bMRN\s*:?\s*\d+\b").unwrap(),
        ),
        (
            PhiKind::Date,
            Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap(),
        ),
        (
            PhiKind::Account,
            Regex::new(r"(?i)\baccount\s*:?\s*\d+\b").unwrap(),
        ),
    ]
});

/// PHI redactor.
pub struct PhiRedactor {
    ner: Option<Arc<dyn NerEngine>>,
}

impl PhiRedactor {
    /// Pattern-only redactor.
    pub fn new() -> Self {
        Self { ner: None }
    }

    /// Attach a NER engine; its spans merge with the pattern spans.
    pub fn with_ner(mut self, ner: Arc<dyn NerEngine>) -> Self {
        self.ner = Some(ner);
        self
    }

    /// Detect PHI spans. Overlaps are resolved by keeping the longest span.
    pub fn detect(&self, text: &str) -> Vec<PhiEntity> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut entities = Vec::new();
        for (kind, pattern) in PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                entities.push(PhiEntity {
                    kind: *kind,
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        if let Some(ner) = &self.ner {
            entities.extend(ner.detect(text));
        }

        dedupe_longest(entities)
    }

    /// Replace every detected span with `replacement`.
    pub fn redact(&self, text: &str, replacement: &str) -> String {
        let mut entities = self.detect(text);
        if entities.is_empty() {
            return text.to_string();
        }

        // Replace back-to-front so earlier offsets stay valid
        entities.sort_by(|a, b| b.start.cmp(&a.start));
        let mut out = text.to_string();
        for entity in entities {
            out.replace_range(entity.start..entity.end, replacement);
        }
        out
    }
}

impl Default for PhiRedactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep the longest span among overlaps.
fn dedupe_longest(mut entities: Vec<PhiEntity>) -> Vec<PhiEntity> {
    entities.sort_by(|a, b| a.start.cmp(&b.start).then(b.len().cmp(&a.len())));

    let mut kept: Vec<PhiEntity> = Vec::new();
    for entity in entities {
        if let Some(conflict) = kept.iter().position(|e| e.overlaps(&entity)) {
            if entity.len() > kept[conflict].len() {
                kept[conflict] = entity;
            }
        } else {
            kept.push(entity);
        }
    }
    kept
}

/// Convenience wrapper with the default replacement token.
pub fn redact_phi(text: &str) -> String {
    PhiRedactor::new().redact(text, "[REDACTED]")
}

/// `MakeWriter` that redacts PHI from every formatted log line before it
/// reaches the wrapped sink. Installed on the global subscriber so no log
/// statement can leak PHI regardless of what fields it interpolates.
pub struct RedactingMakeWriter<M> {
    inner: M,
    redactor: Arc<PhiRedactor>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            redactor: Arc::new(PhiRedactor::new()),
        }
    }

    pub fn with_redactor(inner: M, redactor: Arc<PhiRedactor>) -> Self {
        Self { inner, redactor }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for RedactingMakeWriter<M> {
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            redactor: self.redactor.clone(),
        }
    }
}

/// Writer returned by [`RedactingMakeWriter`].
pub struct RedactingWriter<W> {
    inner: W,
    redactor: Arc<PhiRedactor>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let redacted = self.redactor.redact(&text, "[REDACTED]");
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_ssn_phone_email() {
        let redactor = PhiRedactor::new();
        let text = "ssn 123-45-6789, phone 555.867.5309, mail a.b@clinic.org";
        let out = redactor.redact(text, "[X]");
        assert_eq!(out, "ssn [X], phone [X], mail [X]");
    }

    #[test]
    fn test_redacts_mrn_and_dates() {
        let out = redact_phi("MRN: 884422 seen on 03/14/2024");
        assert_eq!(out, "[REDACTED] seen on [REDACTED]");
    }

    #[test]
    fn test_clean_text_unchanged() {
        let text = "patient stable, follow up in two weeks";
        assert_eq!(redact_phi(text), text);
    }

    #[test]
    fn test_overlap_keeps_longest() {
        // "MRN: 884422" contains digit runs a narrower pattern could also
        // claim; the longest span must win and leave one clean replacement.
        let redactor = PhiRedactor::new();
        let entities = redactor.detect("MRN: 8844221234");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, PhiKind::Mrn);
    }

    #[test]
    fn test_deterministic() {
        let text = "call 555-867-5309 about MRN 12345";
        assert_eq!(redact_phi(text), redact_phi(text));
    }

    struct StubNer;

    impl NerEngine for StubNer {
        fn detect(&self, text: &str) -> Vec<PhiEntity> {
            text.find("Marisol Vega")
                .map(|start| {
                    vec![PhiEntity {
                        kind: PhiKind::NamedEntity,
                        start,
                        end: start + "Marisol Vega".len(),
                    }]
                })
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_ner_spans_merge() {
        let redactor = PhiRedactor::new().with_ner(Arc::new(StubNer));
        let out = redactor.redact("Marisol Vega, 555-867-5309", "[X]");
        assert_eq!(out, "[X], [X]");
    }
}
