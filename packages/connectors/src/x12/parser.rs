//! Raw X12 EDI segment parsing.
//!
//! Separators are taken from the ISA envelope: element separator at byte 3,
//! sub-element separator at byte 104, segment terminator at byte 105. The
//! defaults (`*`, `:`, `~`) apply when the envelope is shorter.

/// One parsed segment. `elements[0]` is the first element after the id.
#[derive(Debug, Clone)]
pub struct X12Segment {
    pub id: String,
    pub elements: Vec<String>,
}

impl X12Segment {
    /// Element by 0-based position after the segment id, or `""`.
    pub fn get(&self, index: usize) -> &str {
        self.elements.get(index).map(String::as_str).unwrap_or("")
    }
}

/// A parsed X12 interchange.
#[derive(Debug, Clone)]
pub struct X12Document {
    pub segments: Vec<X12Segment>,
    pub element_sep: char,
    pub sub_element_sep: char,
    pub segment_sep: char,
    pub transaction_type: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub control_number: String,
}

impl X12Document {
    pub fn parse(data: &str) -> Result<Self, String> {
        let data: String = data
            .trim()
            .chars()
            .filter(|c| *c != '\n' && *c != '\r')
            .collect();

        if !data.starts_with("ISA") {
            return Err("X12 must start with ISA segment".to_string());
        }

        let bytes: Vec<char> = data.chars().collect();
        let element_sep = bytes.get(3).copied().unwrap_or('*');
        let sub_element_sep = bytes.get(104).copied().unwrap_or(':');
        let segment_sep = bytes.get(105).copied().unwrap_or('~');

        let segments: Vec<X12Segment> = data
            .split(segment_sep)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| {
                let mut parts = raw.split(element_sep).map(String::from);
                let id = parts.next().unwrap_or_default();
                X12Segment {
                    id,
                    elements: parts.collect(),
                }
            })
            .collect();

        if segments.is_empty() {
            return Err("no segments found".to_string());
        }

        let isa = segments
            .iter()
            .find(|s| s.id == "ISA")
            .ok_or_else(|| "missing ISA segment".to_string())?;
        let st = segments.iter().find(|s| s.id == "ST");

        Ok(Self {
            transaction_type: st.map(|s| s.get(0).to_string()).unwrap_or_default(),
            sender_id: isa.get(5).trim().to_string(),
            receiver_id: isa.get(7).trim().to_string(),
            control_number: isa.get(12).to_string(),
            segments,
            element_sep,
            sub_element_sep,
            segment_sep,
        })
    }

    pub fn segment(&self, id: &str) -> Option<&X12Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Split a composite element on the interchange's sub-element separator.
    pub fn composite<'a>(&self, element: &'a str) -> Vec<&'a str> {
        element.split(self.sub_element_sep).collect()
    }

    /// Structural validation shared by all X12 connectors.
    pub fn validate(data: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let trimmed = data.trim();
        if !trimmed.starts_with("ISA") {
            errors.push("X12 must start with ISA segment".to_string());
        }
        if !trimmed.contains("IEA") {
            errors.push("missing IEA (interchange end) segment".to_string());
        }
        errors
    }
}

/// `CCYYMMDD` → ISO date; shorter input is passed through.
pub fn format_x12_date(raw: &str) -> Option<String> {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..8]))
    } else if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Monetary element → f64, defaulting to 0.0.
pub fn parse_amount(raw: &str) -> f64 {
    raw.parse().unwrap_or(0.0)
}

/// Numeric element → u32 with a default.
pub fn parse_units(raw: &str, default: u32) -> u32 {
    raw.parse::<f64>().map(|v| v as u32).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isa_envelope(body: &str) -> String {
        // ISA is fixed-width: 16 elements padded so the sub-element
        // separator lands at byte 104 and the terminator at 105
        let isa = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       *240301*1200*^*00501*000000001*0*P*:~";
        assert_eq!(isa.chars().nth(3), Some('*'));
        assert_eq!(isa.chars().nth(104), Some(':'));
        assert_eq!(isa.chars().nth(105), Some('~'));
        format!("{isa}{body}IEA*1*000000001~")
    }

    #[test]
    fn test_separator_detection() {
        let doc = X12Document::parse(&isa_envelope("ST*837*0001~")).unwrap();
        assert_eq!(doc.element_sep, '*');
        assert_eq!(doc.sub_element_sep, ':');
        assert_eq!(doc.segment_sep, '~');
        assert_eq!(doc.transaction_type, "837");
        assert_eq!(doc.sender_id, "SENDER");
        assert_eq!(doc.receiver_id, "RECEIVER");
    }

    #[test]
    fn test_non_isa_rejected() {
        assert!(X12Document::parse("GS*HC~").is_err());
        assert!(!X12Document::validate("GS*HC~").is_empty());
        assert!(X12Document::validate(&isa_envelope("ST*837*0001~")).is_empty());
    }

    #[test]
    fn test_date_and_amount_helpers() {
        assert_eq!(format_x12_date("20240301").as_deref(), Some("2024-03-01"));
        assert_eq!(format_x12_date(""), None);
        assert_eq!(parse_amount("100.00"), 100.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_units("3", 1), 3);
        assert_eq!(parse_units("", 1), 1);
    }
}
