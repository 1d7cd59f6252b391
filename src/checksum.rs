//! CRC16/MODBUS shared by the ASCII and Modbus-RTU codecs.
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF. On the wire
//! the checksum always travels low byte first; every builder and validator
//! in this crate goes through the functions below so the byte order cannot
//! drift between the two paths.

/// CRC16/MODBUS of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    crc16::State::<crc16::MODBUS>::calculate(data)
}

/// The two checksum bytes for `data`, low byte first.
pub fn crc_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

/// Returns `data` followed by its checksum, low byte first.
pub fn append_crc(data: &[u8]) -> Vec<u8> {
    let mut r = Vec::with_capacity(data.len() + 2);
    r.extend_from_slice(data);
    r.extend_from_slice(&crc_bytes(data));
    r
}

/// Reads a checksum as it appears on the wire (low byte first).
pub fn wire_crc(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}
