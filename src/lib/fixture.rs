//! Canned answer served in slave mode, captured from an RPI H5A at night.

const CANNED_PAYLOAD: &str = concat!(
    // identification, 35 bytes
    "3530324e35354530313030323431313931373032303032353033323235313334323031",
    // firmware revisions and zero padding
    "0328102002000d20021610320000000000000000",
    // ac side
    "096f000200001387096a1389",
    "000000000000000000000000000000000000000000000000",
    // dc side
    "0000000000000000000000000000",
    "00000000",
    // energy and runtime counters
    "00000000000000000000337c0218068d",
    "0000000000000000000000000000000000000000000000000000000000000000000000000000",
);

pub fn canned_payload() -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(CANNED_PAYLOAD)
}
