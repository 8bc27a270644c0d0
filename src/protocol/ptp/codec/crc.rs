//! CRC-32 used by the v1 message integrity trailer and subdomain hashing.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Reflected CRC-32 (IEEE 1588-2002 annex C).
#[must_use]
pub fn crc32(buf: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in buf {
        let mut data = byte;
        for _ in 0..8 {
            if (crc ^ u32::from(data)) & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            data >>= 1;
        }
    }
    crc ^ 0xFFFF_FFFF
}
