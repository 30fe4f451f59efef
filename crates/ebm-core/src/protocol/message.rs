//! Operational-protocol message codec.
//!
//! Every command, response and asynchronous event of the operational
//! protocol shares one header shape: type (1), sequence number (4),
//! payload length (2), status (1), then the payload. All integers are
//! big-endian and frames are zero-padded to the 46-byte Ethernet minimum.

use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use super::constants::{MAX_PAYLOAD_LEN, MIN_FRAME_LEN, status_name, type_name};

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message too short: {actual} bytes, header is {expected}")]
    TooShort { expected: usize, actual: usize },
    #[error("declared payload length {declared} overruns the {actual}-byte buffer")]
    TruncatedPayload { declared: usize, actual: usize },
    #[error("payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),
}

/// A single operational-protocol message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub msg_type: u8,
    pub sequence: u32,
    pub status: u8,
    pub payload: Vec<u8>,
}

impl Message {
    /// Fixed header size in bytes.
    pub const HEADER_LEN: usize = 8;

    /// Serialize to wire form, zero-padded to the Ethernet minimum.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(MessageError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = Vec::with_capacity(MIN_FRAME_LEN.max(Self::HEADER_LEN + self.payload.len()));
        buf.push(self.msg_type);
        buf.write_u32::<BigEndian>(self.sequence).unwrap();
        buf.write_u16::<BigEndian>(self.payload.len() as u16).unwrap();
        buf.push(self.status);
        buf.extend_from_slice(&self.payload);
        if buf.len() < MIN_FRAME_LEN {
            buf.resize(MIN_FRAME_LEN, 0);
        }
        Ok(buf)
    }

    /// Parse a received frame. Padding past the declared payload length is
    /// ignored.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() < Self::HEADER_LEN {
            return Err(MessageError::TooShort {
                expected: Self::HEADER_LEN,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let msg_type = cursor.read_u8().unwrap();
        let sequence = cursor.read_u32::<BigEndian>().unwrap();
        let payload_len = cursor.read_u16::<BigEndian>().unwrap() as usize;
        let status = cursor.read_u8().unwrap();
        if Self::HEADER_LEN + payload_len > data.len() {
            return Err(MessageError::TruncatedPayload {
                declared: payload_len,
                actual: data.len(),
            });
        }
        Ok(Self {
            msg_type,
            sequence,
            status,
            payload: data[Self::HEADER_LEN..Self::HEADER_LEN + payload_len].to_vec(),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={} seq={} status={} payload={}",
            type_name(self.msg_type),
            self.sequence,
            status_name(self.status),
            hex::encode(&self.payload)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{STATUS_DEFAULT, TYPE_READ_MIB};

    #[test]
    fn test_encode_pads_to_minimum() {
        let msg = Message {
            msg_type: TYPE_READ_MIB,
            sequence: 42,
            status: STATUS_DEFAULT,
            payload: vec![0x01, 0x02, 0x03],
        };
        let raw = msg.encode().unwrap();
        assert_eq!(raw.len(), 46);
        assert_eq!(&raw[..8], &[0x06, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x03, 0xff]);
        assert_eq!(&raw[8..11], &[0x01, 0x02, 0x03]);
        assert!(raw[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_roundtrip() {
        let msg = Message {
            msg_type: 0x86,
            sequence: 0xdead_beef,
            status: 7,
            payload: (0u8..40).collect(),
        };
        let parsed = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(matches!(
            Message::decode(&[0x06, 0x00, 0x00]),
            Err(MessageError::TooShort { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut raw = Message {
            msg_type: 1,
            sequence: 1,
            status: 0,
            payload: vec![0; 10],
        }
        .encode()
        .unwrap();
        // Declare more payload than the frame carries.
        raw[5] = 0x40;
        raw[6] = 0x00;
        assert!(matches!(
            Message::decode(&raw),
            Err(MessageError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let msg = Message {
            payload: vec![0; 1495],
            ..Default::default()
        };
        assert!(matches!(msg.encode(), Err(MessageError::PayloadTooLarge(1495))));
    }
}
