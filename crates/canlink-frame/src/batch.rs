use tracing::trace;

use crate::codec::{decode_frame, Frame, FRAME_SIZE};

/// Counters for one bulk read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Frames that decoded and verified.
    pub decoded: usize,
    /// Full-size chunks dropped as malformed.
    pub rejected: usize,
    /// Bytes left over after the last full chunk.
    pub trailing_bytes: usize,
}

/// Frames decoded from one bulk read, in byte order.
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub frames: Vec<Frame>,
    pub stats: BatchStats,
}

impl FrameBatch {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

/// Slice a bulk read into 25-byte frames.
///
/// Malformed chunks and a trailing partial chunk are dropped.
pub fn decode_batch(src: &[u8]) -> FrameBatch {
    let chunks = src.chunks_exact(FRAME_SIZE);
    let trailing_bytes = chunks.remainder().len();
    let mut batch = FrameBatch {
        frames: Vec::with_capacity(src.len() / FRAME_SIZE),
        stats: BatchStats {
            trailing_bytes,
            ..BatchStats::default()
        },
    };

    for (index, chunk) in chunks.enumerate() {
        match decode_frame(chunk) {
            Ok(frame) => {
                batch.frames.push(frame);
                batch.stats.decoded += 1;
            }
            Err(err) => {
                trace!(index, error = %err, "dropping malformed frame");
                batch.stats.rejected += 1;
            }
        }
    }

    if trailing_bytes > 0 {
        trace!(trailing_bytes, "dropping partial frame at end of read");
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    fn wire(identifier: u32, payload: &[u8]) -> Vec<u8> {
        encode_frame(1, 0, identifier, payload.len() as u8, payload)
            .unwrap()
            .as_ref()
            .to_vec()
    }

    #[test]
    fn decodes_frames_in_byte_order() {
        let mut buf = wire(0x100, &[1]);
        buf.extend(wire(0x200, &[2]));
        buf.extend(wire(0x300, &[3]));

        let batch = decode_batch(&buf);
        let ids: Vec<u32> = batch.frames.iter().map(|f| f.identifier).collect();
        assert_eq!(ids, vec![0x100, 0x200, 0x300]);
        assert_eq!(
            batch.stats,
            BatchStats {
                decoded: 3,
                rejected: 0,
                trailing_bytes: 0
            }
        );
    }

    #[test]
    fn drops_corrupted_chunk_and_keeps_neighbours() {
        let mut buf = wire(0x100, &[1]);
        let mut bad = wire(0x200, &[2]);
        bad[10] ^= 0xFF;
        buf.extend(bad);
        buf.extend(wire(0x300, &[3]));

        let batch = decode_batch(&buf);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.frames[0].identifier, 0x100);
        assert_eq!(batch.frames[1].identifier, 0x300);
        assert_eq!(batch.stats.rejected, 1);
    }

    #[test]
    fn drops_trailing_partial_chunk() {
        let mut buf = wire(0x100, &[1]);
        buf.extend_from_slice(&wire(0x200, &[2])[..10]);

        let batch = decode_batch(&buf);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.stats.trailing_bytes, 10);
    }

    #[test]
    fn empty_read_yields_empty_batch() {
        let batch = decode_batch(&[]);
        assert!(batch.is_empty());
        assert_eq!(batch.stats, BatchStats::default());
    }
}
