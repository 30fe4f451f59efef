//! Motorola S-record codec.
//!
//! Firmware travels on disk as checksummed ASCII records: `S0` comments,
//! `S3` data records with 32-bit addresses and an `S7` terminator. The
//! byte count covers address, data and checksum; the checksum is the
//! complement of the 8-bit sum of count, address and data.

use byteorder::{BigEndian, WriteBytesExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SrecError {
    #[error("record does not start with S")]
    BadPrefix,
    #[error("record shorter than the 10-character minimum")]
    TooShort,
    #[error("record type digit is not 0-9")]
    BadTypeDigit,
    #[error("invalid hex in record: {0}")]
    BadHex(#[from] hex::FromHexError),
    #[error("byte count {declared} overruns the record")]
    OverlongByteCount { declared: u8 },
    #[error("checksum mismatch: stored {stored:#04x}, computed {computed:#04x}")]
    BadChecksum { stored: u8, computed: u8 },
}

/// Parse one record of any type.
///
/// Returns the record type digit and the counted bytes (address plus data)
/// with the checksum byte verified and stripped. Trailing characters past
/// the byte count, such as the line terminator, are ignored.
pub fn parse_generic(record: &str) -> Result<(u8, Vec<u8>), SrecError> {
    let raw = record.as_bytes();
    if raw.first() != Some(&b'S') {
        return Err(SrecError::BadPrefix);
    }
    if raw.len() < 10 {
        return Err(SrecError::TooShort);
    }
    if !raw[1].is_ascii_digit() {
        return Err(SrecError::BadTypeDigit);
    }
    let typ = raw[1] - b'0';
    let count = hex::decode(&raw[2..4])?[0];
    let counted_len = 4 + 2 * count as usize;
    if counted_len > raw.len() {
        return Err(SrecError::OverlongByteCount { declared: count });
    }
    let payload = hex::decode(&raw[4..counted_len])?;
    let Some((&stored, data)) = payload.split_last() else {
        return Err(SrecError::TooShort);
    };
    let sum = data
        .iter()
        .fold(count, |acc, &b| acc.wrapping_add(b));
    let computed = sum ^ 0xff;
    if stored != computed {
        return Err(SrecError::BadChecksum { stored, computed });
    }
    Ok((typ, data.to_vec()))
}

fn generic_record(typ: u8, addr: &[u8], data: &[u8]) -> String {
    assert!(typ <= 9, "wrong record type");
    let rec_len = addr.len() + data.len() + 1;
    assert!(rec_len <= 255, "record too long");
    let mut rec = Vec::with_capacity(rec_len + 1);
    rec.push(rec_len as u8);
    rec.extend_from_slice(addr);
    rec.extend_from_slice(data);
    let sum = rec.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    rec.push(sum ^ 0xff);
    format!("S{typ}{}\n", hex::encode_upper(rec))
}

/// Emit an `S0` header comment (16-bit address 0).
pub fn s0(comment: &str) -> String {
    generic_record(0, &[0, 0], comment.as_bytes())
}

/// Emit an `S3` data record with a 32-bit address.
pub fn s3(addr: u32, data: &[u8]) -> String {
    let mut addr_bytes = Vec::with_capacity(4);
    addr_bytes.write_u32::<BigEndian>(addr).unwrap();
    generic_record(3, &addr_bytes, data)
}

/// Emit an `S7` terminator with a 32-bit entry address.
pub fn s7(addr: u32) -> String {
    let mut addr_bytes = Vec::with_capacity(4);
    addr_bytes.write_u32::<BigEndian>(addr).unwrap();
    generic_record(7, &addr_bytes, &[])
}
