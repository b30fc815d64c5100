//! CRC-16 used by FIT files for both the header and the file trailer.
//!
//! The checksum is the reflected 0xA001 / 0xCC01 variant computed with a
//! 16-entry nibble table: every byte is folded in twice, low nibble first.

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Fold one byte into a running checksum.
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut tmp = CRC_TABLE[(crc & 0xF) as usize];
    let mut crc = (crc >> 4) & 0x0FFF;
    crc ^= tmp ^ CRC_TABLE[(byte & 0xF) as usize];
    tmp = CRC_TABLE[(crc & 0xF) as usize];
    crc = (crc >> 4) & 0x0FFF;
    crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize]
}

pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, byte| crc16_update(crc, *byte))
}

/// Check that the last two bytes of `buffer` are the little-endian CRC of
/// everything before them.
pub fn verify_checksum(buffer: &[u8]) -> bool {
    match buffer.len().checked_sub(2) {
        Some(split) => {
            let (body, trailer) = buffer.split_at(split);
            crc16(body) == u16::from_le_bytes([trailer[0], trailer[1]])
        }
        None => false,
    }
}
