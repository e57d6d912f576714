//! Expected-field matching.
//!
//! Expected values arrive as text from test scripts. Payloads and
//! identifiers are normalized before comparison; every other field is
//! compared against the frame's text rendering verbatim after trimming.

use std::fmt;
use std::str::FromStr;

use canlink_frame::{hex_identifier, Frame, FrameField};
use tracing::trace;

use crate::error::CriteriaError;

/// One byte of a payload pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadByte {
    Exact(u8),
    /// `XX`: any value.
    Any,
}

/// Expected payload, possibly with `XX` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPattern {
    bytes: Vec<PayloadByte>,
}

impl PayloadPattern {
    /// Parse `FF00AA55`, `ff 00 aa 55`, `FF-XX-AA-55`, `FF:00:AA:55` and the like.
    pub fn parse(text: &str) -> Result<Self, CriteriaError> {
        let cleaned: String = text
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | ':'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if cleaned.len() % 2 != 0 {
            return Err(CriteriaError::OddPayloadLength(text.to_string()));
        }

        let mut bytes = Vec::with_capacity(cleaned.len() / 2);
        for pair in cleaned.as_bytes().chunks(2) {
            let token = std::str::from_utf8(pair)
                .map_err(|_| CriteriaError::InvalidPayload(text.to_string()))?;
            let byte = if token == "XX" {
                PayloadByte::Any
            } else if !pair.iter().all(u8::is_ascii_hexdigit) {
                return Err(CriteriaError::InvalidPayload(text.to_string()));
            } else {
                u8::from_str_radix(token, 16)
                    .map(PayloadByte::Exact)
                    .map_err(|_| CriteriaError::InvalidPayload(text.to_string()))?
            };
            bytes.push(byte);
        }
        Ok(Self { bytes })
    }

    /// Byte count and every non-wildcard byte must agree.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.bytes.len() == data.len()
            && self.bytes.iter().zip(data).all(|(expected, actual)| match expected {
                PayloadByte::Any => true,
                PayloadByte::Exact(b) => b == actual,
            })
    }

    /// The concrete bytes, or `None` if the pattern has a wildcard.
    pub fn exact_bytes(&self) -> Option<Vec<u8>> {
        self.bytes
            .iter()
            .map(|byte| match byte {
                PayloadByte::Exact(b) => Some(*b),
                PayloadByte::Any => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl FromStr for PayloadPattern {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PayloadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match byte {
                PayloadByte::Exact(b) => write!(f, "{b:02X}")?,
                PayloadByte::Any => f.write_str("XX")?,
            }
        }
        Ok(())
    }
}

/// Canonical payload text: uppercase hex pairs separated by single spaces.
pub fn normalize_payload(text: &str) -> Result<String, CriteriaError> {
    PayloadPattern::parse(text).map(|p| p.to_string())
}

/// Parse a bare decimal or `0x`-prefixed hex identifier.
pub fn parse_identifier(text: &str) -> Result<u32, CriteriaError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => trimmed.parse::<u32>(),
    };
    parsed.map_err(|_| CriteriaError::InvalidIdentifier(text.to_string()))
}

/// Canonical identifier text: `0x` plus uppercase hex (`0x207`).
pub fn normalize_identifier(text: &str) -> Result<String, CriteriaError> {
    parse_identifier(text).map(hex_identifier)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expectation {
    Payload(PayloadPattern),
    Identifier(u32),
    Field(FrameField, String),
}

impl Expectation {
    fn field(&self) -> FrameField {
        match self {
            Expectation::Payload(_) => FrameField::Payload,
            Expectation::Identifier(_) => FrameField::Identifier,
            Expectation::Field(field, _) => *field,
        }
    }

    fn matches(&self, frame: &Frame) -> bool {
        match self {
            Expectation::Payload(pattern) => pattern.matches(frame.data()),
            Expectation::Identifier(id) => frame.identifier == *id,
            Expectation::Field(field, expected) => frame.field(*field).trim() == expected,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Payload(pattern) => write!(f, "payload={pattern}"),
            Expectation::Identifier(id) => write!(f, "can_id={}", hex_identifier(*id)),
            Expectation::Field(field, value) => write!(f, "{field}={value}"),
        }
    }
}

/// The set of fields a frame must match. All must agree on one frame.
///
/// An empty set matches any frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    expectations: Vec<Expectation>,
}

impl Criteria {
    /// Criteria that match any frame.
    pub fn any() -> Self {
        Self::default()
    }

    /// Build from `(field name, expected value)` pairs. Empty values are
    /// skipped.
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, CriteriaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        fields
            .into_iter()
            .try_fold(Self::any(), |criteria, (name, value)| {
                criteria.field(name.as_ref(), value.as_ref())
            })
    }

    pub fn payload(self, text: &str) -> Result<Self, CriteriaError> {
        let pattern = PayloadPattern::parse(text)?;
        Ok(self.with(Expectation::Payload(pattern)))
    }

    pub fn identifier(self, text: &str) -> Result<Self, CriteriaError> {
        let id = parse_identifier(text)?;
        Ok(self.identifier_value(id))
    }

    pub fn identifier_value(self, identifier: u32) -> Self {
        self.with(Expectation::Identifier(identifier))
    }

    /// Expect a named field. `payload` and `can_id` (or their aliases) are
    /// normalized; other fields compare as trimmed text.
    pub fn field(self, name: &str, value: &str) -> Result<Self, CriteriaError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(self);
        }
        let field = FrameField::from_str(name)
            .map_err(|_| CriteriaError::UnknownField(name.to_string()))?;
        match field {
            FrameField::Payload => self.payload(value),
            FrameField::Identifier => self.identifier(value),
            other => Ok(self.with(Expectation::Field(other, value.to_string()))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    /// Whether every expected field matches `frame`.
    pub fn matches(&self, frame: &Frame) -> bool {
        for expectation in &self.expectations {
            if !expectation.matches(frame) {
                trace!(
                    field = %expectation.field(),
                    expected = %expectation,
                    actual = %frame.field(expectation.field()),
                    "field mismatch"
                );
                return false;
            }
        }
        true
    }

    /// Expected fields in canonical text form.
    pub fn describe(&self) -> Vec<(FrameField, String)> {
        self.expectations
            .iter()
            .map(|e| {
                let value = match e {
                    Expectation::Payload(p) => p.to_string(),
                    Expectation::Identifier(id) => hex_identifier(*id),
                    Expectation::Field(_, v) => v.clone(),
                };
                (e.field(), value)
            })
            .collect()
    }

    // A later expectation on the same field replaces the earlier one.
    fn with(mut self, expectation: Expectation) -> Self {
        let field = expectation.field();
        self.expectations.retain(|e| e.field() != field);
        self.expectations.push(expectation);
        self
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expectations.is_empty() {
            return f.write_str("any frame");
        }
        for (i, expectation) in self.expectations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{expectation}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canlink_frame::Marker;

    fn frame(identifier: u32, length: u8, payload: &[u8]) -> Frame {
        Frame::with_length(Marker::Data, 0, 1, 0, identifier, length, payload).unwrap()
    }

    #[test]
    fn payload_normalization() {
        assert_eq!(normalize_payload("FF00AA55").unwrap(), "FF 00 AA 55");
        assert_eq!(normalize_payload("ff 00 aa 55").unwrap(), "FF 00 AA 55");
        assert_eq!(normalize_payload("ff-00:aa 55").unwrap(), "FF 00 AA 55");
        assert_eq!(normalize_payload("ff xx aa55").unwrap(), "FF XX AA 55");
        assert_eq!(normalize_payload("").unwrap(), "");
    }

    #[test]
    fn exact_bytes_only_without_wildcards() {
        let exact = PayloadPattern::parse("0A 0b").unwrap();
        assert_eq!(exact.exact_bytes(), Some(vec![0x0A, 0x0B]));
        assert_eq!(PayloadPattern::parse("0AXX").unwrap().exact_bytes(), None);
        assert_eq!(PayloadPattern::parse("").unwrap().exact_bytes(), Some(vec![]));
    }

    #[test]
    fn payload_rejects_bad_input() {
        assert!(matches!(
            normalize_payload("FF0"),
            Err(CriteriaError::OddPayloadLength(_))
        ));
        assert!(matches!(
            normalize_payload("GG00"),
            Err(CriteriaError::InvalidPayload(_))
        ));
        assert!(matches!(
            normalize_payload("X5"),
            Err(CriteriaError::InvalidPayload(_))
        ));
    }

    #[test]
    fn identifier_normalization() {
        assert_eq!(normalize_identifier("0x207").unwrap(), "0x207");
        assert_eq!(normalize_identifier("0X0207").unwrap(), "0x207");
        assert_eq!(normalize_identifier(" 519 ").unwrap(), "0x207");
        assert!(normalize_identifier("0xZZ").is_err());
        assert!(normalize_identifier("207h").is_err());
    }

    #[test]
    fn wildcard_payload_matches_any_byte() {
        let pattern = PayloadPattern::parse("FF XX AA 55").unwrap();
        assert!(pattern.matches(&[0xFF, 0x12, 0xAA, 0x55]));
        assert!(!pattern.matches(&[0xFF, 0x12, 0xAA, 0x66]));
        assert!(!pattern.matches(&[0xFF, 0x12, 0xAA]));
    }

    #[test]
    fn compact_payload_matches_rendered_frame() {
        let criteria = Criteria::any().payload("FF00AA55").unwrap();
        assert!(criteria.matches(&frame(0x207, 4, &[0xFF, 0x00, 0xAA, 0x55])));
        assert!(!criteria.matches(&frame(0x207, 8, &[0xFF, 0x00, 0xAA, 0x55])));
    }

    #[test]
    fn all_fields_must_match_one_frame() {
        let criteria = Criteria::from_fields([("payload", "01"), ("can_id", "0x10"), ("node", "1")])
            .unwrap();
        assert_eq!(criteria.len(), 3);
        assert!(criteria.matches(&frame(0x10, 1, &[0x01])));
        assert!(!criteria.matches(&frame(0x11, 1, &[0x01])));
        assert!(!criteria.matches(&frame(0x10, 1, &[0x02])));
    }

    #[test]
    fn other_fields_compare_case_sensitively() {
        let f = frame(0x10, 0, &[]);
        let checksum = f.field(FrameField::Checksum);
        assert!(Criteria::any()
            .field("crc32", &format!(" {checksum} "))
            .unwrap()
            .matches(&f));
        assert!(!Criteria::any()
            .field("header", "0xffff")
            .unwrap()
            .matches(&f));
        assert!(Criteria::any()
            .field("header", "0xFFFF")
            .unwrap()
            .matches(&f));
    }

    #[test]
    fn empty_criteria_match_anything() {
        let criteria = Criteria::any();
        assert!(criteria.is_empty());
        assert!(criteria.matches(&frame(0x1, 0, &[])));
        assert_eq!(criteria.to_string(), "any frame");
    }

    #[test]
    fn empty_values_are_skipped_and_unknown_fields_rejected() {
        let criteria = Criteria::from_fields([("payload", ""), ("node", "  ")]).unwrap();
        assert!(criteria.is_empty());
        assert!(matches!(
            Criteria::any().field("voltage", "12"),
            Err(CriteriaError::UnknownField(_))
        ));
    }

    #[test]
    fn later_expectation_replaces_earlier() {
        let criteria = Criteria::any()
            .identifier("0x10")
            .unwrap()
            .field("can_id", "32")
            .unwrap();
        assert_eq!(criteria.len(), 1);
        assert_eq!(criteria.to_string(), "can_id=0x20");
    }
}
