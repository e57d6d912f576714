//! Frame markers.
//!
//! The first two bytes of every frame distinguish regular data traffic from
//! acknowledgements emitted by the adapter.

use std::fmt;

/// Regular data frame.
pub const DATA: u16 = 0xFFFF;

/// Acknowledgement frame.
pub const ACK: u16 = 0xAAAA;

/// Kind of frame, decoded from the wire marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Marker {
    Data,
    Ack,
}

impl Marker {
    /// Decode a wire marker. Returns `None` for anything other than DATA/ACK.
    pub fn from_wire(raw: u16) -> Option<Self> {
        match raw {
            DATA => Some(Self::Data),
            ACK => Some(Self::Ack),
            _ => None,
        }
    }

    /// The 16-bit value written on the wire.
    pub fn wire(self) -> u16 {
        match self {
            Self::Data => DATA,
            Self::Ack => ACK,
        }
    }

    pub fn name(self) -> &'static str {
        marker_name(self.wire())
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns a human-readable name for a raw marker value.
pub fn marker_name(raw: u16) -> &'static str {
    match raw {
        DATA => "DATA",
        ACK => "ACK",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_map_both_ways() {
        assert_eq!(Marker::from_wire(0xFFFF), Some(Marker::Data));
        assert_eq!(Marker::from_wire(0xAAAA), Some(Marker::Ack));
        assert_eq!(Marker::Data.wire(), 0xFFFF);
        assert_eq!(Marker::Ack.wire(), 0xAAAA);
    }

    #[test]
    fn unknown_marker_is_rejected() {
        assert_eq!(Marker::from_wire(0x0000), None);
        assert_eq!(Marker::from_wire(0xFFFE), None);
        assert_eq!(marker_name(0x1234), "UNKNOWN");
    }
}
