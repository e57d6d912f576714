use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};

use crate::checksum::checksum;
use crate::error::{FrameError, Result};
use crate::marker::Marker;

/// Wire size of every frame.
pub const FRAME_SIZE: usize = 25;

/// Offset of the checksum; the checksum covers `[0, CHECKSUM_OFFSET)`.
pub const CHECKSUM_OFFSET: usize = 21;

/// Size of the payload field.
pub const MAX_PAYLOAD: usize = 8;

/// A decoded, checksum-verified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub marker: Marker,
    /// Sender timestamp in milliseconds, truncated to 32 bits.
    pub tick: u32,
    pub node: u8,
    pub kind: u8,
    /// CAN identifier.
    pub identifier: u32,
    /// Number of meaningful payload bytes (0..=8).
    pub length: u8,
    /// Payload field, zero-padded past `length`.
    pub payload: [u8; MAX_PAYLOAD],
    pub checksum: u32,
}

impl Frame {
    /// Build a frame whose data length equals `data.len()`.
    pub fn new(
        marker: Marker,
        tick: u32,
        node: u8,
        kind: u8,
        identifier: u32,
        data: &[u8],
    ) -> Result<Self> {
        let length = u8::try_from(data.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: data.len(),
            max: MAX_PAYLOAD,
        })?;
        Self::with_length(marker, tick, node, kind, identifier, length, data)
    }

    /// Build a frame with an explicit data length.
    ///
    /// `payload` may be shorter than `length`; missing bytes are zero.
    pub fn with_length(
        marker: Marker,
        tick: u32,
        node: u8,
        kind: u8,
        identifier: u32,
        length: u8,
        payload: &[u8],
    ) -> Result<Self> {
        if usize::from(length) > MAX_PAYLOAD || payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len().max(usize::from(length)),
                max: MAX_PAYLOAD,
            });
        }
        if payload.len() > usize::from(length) {
            return Err(FrameError::PayloadExceedsLength {
                size: payload.len(),
                length,
            });
        }

        let mut padded = [0u8; MAX_PAYLOAD];
        padded[..payload.len()].copy_from_slice(payload);

        let mut frame = Self {
            marker,
            tick,
            node,
            kind,
            identifier,
            length,
            payload: padded,
            checksum: 0,
        };
        let raw = frame.to_wire();
        frame.checksum = checksum(&raw.as_bytes()[..CHECKSUM_OFFSET]);
        Ok(frame)
    }

    /// The meaningful payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.payload[..usize::from(self.length).min(MAX_PAYLOAD)]
    }

    /// Serialize this frame, writing the stored checksum as-is.
    pub fn to_wire(&self) -> RawFrame {
        let mut out = [0u8; FRAME_SIZE];
        let mut dst = &mut out[..];
        dst.put_u16_le(self.marker.wire());
        dst.put_u32_le(self.tick);
        dst.put_u8(self.node);
        dst.put_u8(self.kind);
        dst.put_u32_le(self.identifier);
        dst.put_u8(self.length);
        dst.put_slice(&self.payload);
        dst.put_u32_le(self.checksum);
        RawFrame(out)
    }
}

/// The 25 bytes of one frame as carried on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawFrame([u8; FRAME_SIZE]);

impl RawFrame {
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_SIZE] {
        self.0
    }
}

impl From<[u8; FRAME_SIZE]> for RawFrame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFrame(")?;
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        write!(f, ")")
    }
}

/// Host timestamp in milliseconds, truncated to 32 bits.
pub fn host_tick() -> u32 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    (millis & 0xFFFF_FFFF) as u32
}

/// Encode a DATA frame stamped with the current host tick.
///
/// Wire format:
/// ```text
/// ┌─────────┬─────────┬──────┬──────┬────────────┬────────┬───────────┬─────────┐
/// │ Marker  │ Tick    │ Node │ Kind │ Identifier │ Length │ Payload   │ CRC-32  │
/// │ (2B LE) │ (4B LE) │ (1B) │ (1B) │ (4B LE)    │ (1B)   │ (8B, pad) │ (4B LE) │
/// └─────────┴─────────┴──────┴──────┴────────────┴────────┴───────────┴─────────┘
/// ```
pub fn encode_frame(
    node: u8,
    kind: u8,
    identifier: u32,
    length: u8,
    payload: &[u8],
) -> Result<RawFrame> {
    let frame = Frame::with_length(
        Marker::Data,
        host_tick(),
        node,
        kind,
        identifier,
        length,
        payload,
    )?;
    Ok(frame.to_wire())
}

/// Decode and verify exactly one frame.
pub fn decode_frame(src: &[u8]) -> Result<Frame> {
    if src.len() != FRAME_SIZE {
        return Err(FrameError::InvalidSize { size: src.len() });
    }

    let mut buf = src;
    let raw_marker = buf.get_u16_le();
    let marker = Marker::from_wire(raw_marker).ok_or(FrameError::UnknownMarker(raw_marker))?;
    let tick = buf.get_u32_le();
    let node = buf.get_u8();
    let kind = buf.get_u8();
    let identifier = buf.get_u32_le();
    let length = buf.get_u8();
    let mut payload = [0u8; MAX_PAYLOAD];
    buf.copy_to_slice(&mut payload);
    let stored = buf.get_u32_le();

    let computed = checksum(&src[..CHECKSUM_OFFSET]);
    if stored != computed {
        return Err(FrameError::ChecksumMismatch {
            expected: computed,
            actual: stored,
        });
    }
    if usize::from(length) > MAX_PAYLOAD {
        return Err(FrameError::InvalidLength(length));
    }

    Ok(Frame {
        marker,
        tick,
        node,
        kind,
        identifier,
        length,
        payload,
        checksum: stored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02X}")).collect()
    }

    #[test]
    fn encodes_zero_payload_reference_frame() {
        let frame = Frame::with_length(Marker::Data, 0, 1, 0, 0x207, 8, &[]).unwrap();
        assert_eq!(frame.checksum, 0x709F_5E4F);
        assert_eq!(
            hex(frame.to_wire().as_ref()),
            "FFFF000000000100070200000800000000000000004F5E9F70"
        );
    }

    #[test]
    fn encodes_short_payload_reference_frame() {
        let frame = Frame::with_length(
            Marker::Data,
            0x1234_5678,
            1,
            0,
            0x207,
            4,
            &[0xFF, 0x00, 0xAA, 0x55],
        )
        .unwrap();
        assert_eq!(
            hex(frame.to_wire().as_ref()),
            "FFFF7856341201000702000004FF00AA550000000010CE4C28"
        );
    }

    #[test]
    fn encodes_ack_reference_frame() {
        let frame = Frame::new(Marker::Ack, 1000, 0, 1, 0x301, &[0x0A, 0, 0, 0, 0]).unwrap();
        assert_eq!(frame.checksum, 0xDE62_ECC2);
        assert_eq!(
            hex(frame.to_wire().as_ref()),
            "AAAAE8030000000101030000050A00000000000000C2EC62DE"
        );
    }

    #[test]
    fn encode_then_decode_preserves_fields() {
        let raw = encode_frame(3, 2, 0x1AB, 6, &[1, 2, 3, 4, 5, 6]).unwrap();
        let frame = decode_frame(raw.as_ref()).unwrap();

        assert_eq!(frame.marker, Marker::Data);
        assert_eq!(frame.node, 3);
        assert_eq!(frame.kind, 2);
        assert_eq!(frame.identifier, 0x1AB);
        assert_eq!(frame.length, 6);
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.payload[6..], [0, 0]);
    }

    #[test]
    fn encode_pads_payload_up_to_length() {
        let raw = encode_frame(1, 0, 0x10, 8, &[0xAB]).unwrap();
        let frame = decode_frame(raw.as_ref()).unwrap();
        assert_eq!(frame.length, 8);
        assert_eq!(frame.data(), &[0xAB, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let err = encode_frame(1, 0, 0x10, 8, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn encode_rejects_length_over_eight() {
        let err = encode_frame(1, 0, 0x10, 9, &[]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn encode_rejects_payload_longer_than_length() {
        let err = encode_frame(1, 0, 0x10, 2, &[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadExceedsLength { size: 3, length: 2 }
        ));
    }

    #[test]
    fn decode_rejects_wrong_size() {
        let raw = encode_frame(1, 0, 0x10, 0, &[]).unwrap();
        assert!(matches!(
            decode_frame(&raw.as_ref()[..24]),
            Err(FrameError::InvalidSize { size: 24 })
        ));
        let mut long = raw.as_ref().to_vec();
        long.push(0);
        assert!(matches!(
            decode_frame(&long),
            Err(FrameError::InvalidSize { size: 26 })
        ));
    }

    #[test]
    fn decode_rejects_unknown_marker() {
        let mut bytes = encode_frame(1, 0, 0x10, 0, &[]).unwrap().into_bytes();
        bytes[0] = 0x12;
        bytes[1] = 0x34;
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::UnknownMarker(0x3412))
        ));
    }

    #[test]
    fn decode_rejects_corrupted_checksum() {
        let mut bytes = encode_frame(1, 0, 0x10, 1, &[7]).unwrap().into_bytes();
        bytes[24] ^= 0x01;
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_corrupted_body() {
        let mut bytes = encode_frame(1, 0, 0x10, 1, &[7]).unwrap().into_bytes();
        bytes[13] ^= 0x80;
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn decode_rejects_length_over_eight_even_with_valid_checksum() {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = 0xFF;
        bytes[1] = 0xFF;
        bytes[12] = 9;
        let crc = checksum(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::InvalidLength(9))
        ));
    }

    #[test]
    fn host_tick_is_stamped_on_encode() {
        let before = host_tick();
        let frame = decode_frame(encode_frame(1, 0, 1, 0, &[]).unwrap().as_ref()).unwrap();
        let after = host_tick();
        if before <= after {
            assert!(frame.tick >= before && frame.tick <= after);
        }
    }
}
