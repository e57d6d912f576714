//! Text rendering of frame fields.
//!
//! Expected values in test scripts are written in this form, so the
//! renderings here are what frame matching compares against.

use std::fmt;
use std::str::FromStr;

use crate::codec::Frame;
use crate::error::FrameError;

/// `0x` followed by uppercase hex, no zero padding (`0x207`).
pub fn hex_identifier(value: u32) -> String {
    format!("0x{value:X}")
}

/// Space-separated uppercase hex pairs (`FF 00 AA 55`).
pub fn hex_payload(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The four wire bytes of a checksum as uppercase hex pairs (`4F5E9F70`).
pub fn hex_checksum(crc: u32) -> String {
    crc.to_le_bytes().iter().map(|b| format!("{b:02X}")).collect()
}

/// A named frame field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameField {
    Marker,
    Tick,
    Node,
    Kind,
    Identifier,
    Length,
    Payload,
    Checksum,
}

impl FrameField {
    pub const ALL: [FrameField; 8] = [
        FrameField::Marker,
        FrameField::Tick,
        FrameField::Node,
        FrameField::Kind,
        FrameField::Identifier,
        FrameField::Length,
        FrameField::Payload,
        FrameField::Checksum,
    ];

    /// Canonical field name as used in expected-value maps.
    pub fn name(self) -> &'static str {
        match self {
            FrameField::Marker => "header",
            FrameField::Tick => "systick",
            FrameField::Node => "node",
            FrameField::Kind => "can_type",
            FrameField::Identifier => "can_id",
            FrameField::Length => "data_length",
            FrameField::Payload => "payload",
            FrameField::Checksum => "crc32",
        }
    }
}

impl fmt::Display for FrameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FrameField {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" | "marker" => Ok(FrameField::Marker),
            "systick" | "tick" => Ok(FrameField::Tick),
            "node" => Ok(FrameField::Node),
            "can_type" | "kind" => Ok(FrameField::Kind),
            "can_id" | "identifier" | "id" => Ok(FrameField::Identifier),
            "data_length" | "length" | "dlc" => Ok(FrameField::Length),
            "payload" | "data" => Ok(FrameField::Payload),
            "crc32" | "checksum" => Ok(FrameField::Checksum),
            _ => Err(FrameError::UnknownField(s.to_string())),
        }
    }
}

impl Frame {
    /// Text rendering of a single field.
    pub fn field(&self, field: FrameField) -> String {
        match field {
            FrameField::Marker => hex_identifier(u32::from(self.marker.wire())),
            FrameField::Tick => self.tick.to_string(),
            FrameField::Node => self.node.to_string(),
            FrameField::Kind => self.kind.to_string(),
            FrameField::Identifier => hex_identifier(self.identifier),
            FrameField::Length => self.length.to_string(),
            FrameField::Payload => hex_payload(self.data()),
            FrameField::Checksum => hex_checksum(self.checksum),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CAN Packet:")?;
        writeln!(f, "  Header: {}", self.field(FrameField::Marker))?;
        writeln!(f, "  Systick: {}", self.tick)?;
        writeln!(f, "  Node: {}", self.node)?;
        writeln!(f, "  CAN Type: {}", self.kind)?;
        writeln!(f, "  CAN ID: {}", self.field(FrameField::Identifier))?;
        writeln!(f, "  Data Length: {}", self.length)?;
        writeln!(f, "  Payload: {}", self.field(FrameField::Payload))?;
        write!(f, "  CRC32: {}", self.field(FrameField::Checksum))
    }
}
