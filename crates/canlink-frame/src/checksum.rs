//! CRC-32 used by the adapter firmware.
//!
//! MSB-first, polynomial `0x04C11DB7`, initial value 0, no input/output
//! reflection and no final XOR. The result is written little-endian after
//! the first 21 bytes of a frame.

const POLY: u32 = 0x04C1_1DB7;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the frame checksum over `data`.
///
/// Empty input yields the initial value, 0.
pub fn checksum(data: &[u8]) -> u32 {
    if data.is_empty() {
        return 0;
    }
    data.iter().fold(0u32, |crc, &byte| {
        (crc << 8) ^ TABLE[((crc >> 24) ^ u32::from(byte)) as usize & 0xFF]
    })
}
