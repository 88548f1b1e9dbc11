use crc::{Crc, CRC_16_ARC};

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC-16/ARC as used by the Delta RS-485 protocol (reflected 0x8005, init 0).
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}
