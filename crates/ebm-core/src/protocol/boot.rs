//! Bootloader-protocol frame codec.
//!
//! The on-chip bootloader speaks a simpler header than the operational
//! firmware: sequence number (2), payload length (2), type (2), then the
//! payload. Big-endian, zero-padded to the 46-byte Ethernet minimum.

use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use super::constants::{MAX_PAYLOAD_LEN, MIN_FRAME_LEN};

#[derive(Error, Debug)]
pub enum BootFrameError {
    #[error("frame too short: {actual} bytes, header is {expected}")]
    TooShort { expected: usize, actual: usize },
    #[error("declared payload length {declared} overruns the {actual}-byte buffer")]
    TruncatedPayload { declared: usize, actual: usize },
    #[error("payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),
}

/// A single bootloader-protocol frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootFrame {
    pub sequence: u16,
    pub frame_type: u16,
    pub payload: Vec<u8>,
}

impl BootFrame {
    /// Fixed header size in bytes.
    pub const HEADER_LEN: usize = 6;

    pub fn new(frame_type: u16, payload: Vec<u8>) -> Self {
        Self {
            sequence: 0,
            frame_type,
            payload,
        }
    }

    /// Serialize to wire form, zero-padded to the Ethernet minimum.
    pub fn encode(&self) -> Result<Vec<u8>, BootFrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(BootFrameError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = Vec::with_capacity(MIN_FRAME_LEN.max(Self::HEADER_LEN + self.payload.len()));
        buf.write_u16::<BigEndian>(self.sequence).unwrap();
        buf.write_u16::<BigEndian>(self.payload.len() as u16).unwrap();
        buf.write_u16::<BigEndian>(self.frame_type).unwrap();
        buf.extend_from_slice(&self.payload);
        if buf.len() < MIN_FRAME_LEN {
            buf.resize(MIN_FRAME_LEN, 0);
        }
        Ok(buf)
    }

    /// Parse a received frame. Padding past the declared payload length is
    /// ignored.
    pub fn decode(data: &[u8]) -> Result<Self, BootFrameError> {
        if data.len() < Self::HEADER_LEN {
            return Err(BootFrameError::TooShort {
                expected: Self::HEADER_LEN,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let sequence = cursor.read_u16::<BigEndian>().unwrap();
        let payload_len = cursor.read_u16::<BigEndian>().unwrap() as usize;
        let frame_type = cursor.read_u16::<BigEndian>().unwrap();
        if Self::HEADER_LEN + payload_len > data.len() {
            return Err(BootFrameError::TruncatedPayload {
                declared: payload_len,
                actual: data.len(),
            });
        }
        Ok(Self {
            sequence,
            frame_type,
            payload: data[Self::HEADER_LEN..Self::HEADER_LEN + payload_len].to_vec(),
        })
    }
}

impl fmt::Display for BootFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={:#04x} seq={} payload={}",
            self.frame_type,
            self.sequence,
            hex::encode(&self.payload)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::BOOT_TYPE_DOWNLOAD_BEGIN;

    #[test]
    fn test_encode_layout_and_padding() {
        let frame = BootFrame {
            sequence: 7,
            frame_type: BOOT_TYPE_DOWNLOAD_BEGIN,
            payload: vec![0xba, 0x00],
        };
        let raw = frame.encode().unwrap();
        assert_eq!(raw.len(), 46);
        assert_eq!(&raw[..6], &[0x00, 0x07, 0x00, 0x02, 0x00, 0x11]);
        assert_eq!(&raw[6..8], &[0xba, 0x00]);
        assert!(raw[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_roundtrip() {
        let frame = BootFrame {
            sequence: 0xbeef,
            frame_type: 0x14,
            payload: (0u8..64).collect(),
        };
        let parsed = BootFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            BootFrame::decode(&[0x00; 5]),
            Err(BootFrameError::TooShort { .. })
        ));

        let mut raw = BootFrame::new(0x14, vec![0]).encode().unwrap();
        raw[2] = 0x10;
        raw[3] = 0x00;
        assert!(matches!(
            BootFrame::decode(&raw),
            Err(BootFrameError::TruncatedPayload { .. })
        ));
    }
}
