//! Typed MIB variable codec.
//!
//! Device state is exposed as a hierarchical OID namespace loosely
//! analogous to SNMP. Each OID addresses a typed scalar or array; the wire
//! form is eight big-endian words (three identifier words, one always-zero
//! word, offset, length, type tag, reserved) followed by the value payload
//! on writes and on successful read responses.

pub mod catalog;

use std::fmt;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OidError {
    #[error("OID payload too short: {actual} bytes, need {expected}")]
    TooShort { expected: usize, actual: usize },
    #[error("value {value} does not match OID type {expected}")]
    TypeMismatch { expected: OidType, value: String },
    #[error("unsupported OID type tag {0}")]
    UnsupportedType(u32),
}

/// Element type of an OID, as carried in the wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OidType {
    Uint32 = 0,
    Int32 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint8 = 4,
    Int8 = 5,
    String = 6,
    Bool = 7,
    Invalid = 8,
}

impl OidType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Uint32),
            1 => Some(Self::Int32),
            2 => Some(Self::Uint16),
            3 => Some(Self::Int16),
            4 => Some(Self::Uint8),
            5 => Some(Self::Int8),
            6 => Some(Self::String),
            7 => Some(Self::Bool),
            8 => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for OidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OidType::Uint32 => "uint32",
            OidType::Int32 => "int32",
            OidType::Uint16 => "uint16",
            OidType::Int16 => "int16",
            OidType::Uint8 => "uint8",
            OidType::Int8 => "int8",
            OidType::String => "string",
            OidType::Bool => "bool",
            OidType::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// How a variable may be accessed. Informational; the device enforces the
/// real policy and reports `ACCESS_DENIED` on violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Read,
    Write,
    ReadWrite,
}

/// A typed variable identifier.
///
/// `length` counts elements of `element_type`, not bytes. `offset` windows
/// reads into large arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Oid {
    pub id: [u32; 3],
    pub length: u32,
    pub offset: u32,
    pub element_type: OidType,
    pub access: AccessMode,
}

/// A value read from or written to an OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MibValue {
    Uint32(u32),
    Uint16(u16),
    Uint8(u8),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
}

impl fmt::Display for MibValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MibValue::Uint32(v) => write!(f, "{v}"),
            MibValue::Uint16(v) => write!(f, "{v}"),
            MibValue::Uint8(v) => write!(f, "{v}"),
            MibValue::Bytes(v) => write!(f, "{}", hex::encode(v)),
            MibValue::Text(v) => write!(f, "{v}"),
            MibValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl MibValue {
    fn type_name(&self) -> &'static str {
        match self {
            MibValue::Uint32(_) => "uint32",
            MibValue::Uint16(_) => "uint16",
            MibValue::Uint8(_) => "uint8",
            MibValue::Bytes(_) => "bytes",
            MibValue::Text(_) => "string",
            MibValue::Bool(_) => "bool",
        }
    }
}

impl Oid {
    /// Size of the wire form without any value payload.
    pub const WIRE_LEN: usize = 32;

    pub const fn uint32(a: u32, b: u32, c: u32) -> Self {
        Self {
            id: [a, b, c],
            length: 1,
            offset: 0,
            element_type: OidType::Uint32,
            access: AccessMode::Read,
        }
    }

    pub const fn uint16(a: u32, b: u32, c: u32) -> Self {
        Self {
            id: [a, b, c],
            length: 1,
            offset: 0,
            element_type: OidType::Uint16,
            access: AccessMode::Read,
        }
    }

    pub const fn uint8(a: u32, b: u32, c: u32) -> Self {
        Self {
            id: [a, b, c],
            length: 1,
            offset: 0,
            element_type: OidType::Uint8,
            access: AccessMode::Read,
        }
    }

    pub const fn string(a: u32, b: u32, c: u32, length: u32) -> Self {
        Self {
            id: [a, b, c],
            length,
            offset: 0,
            element_type: OidType::String,
            access: AccessMode::Read,
        }
    }

    /// Marshal the wire form without a value, as used by read requests.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        for word in self.id {
            buf.write_u32::<BigEndian>(word).unwrap();
        }
        buf.write_u32::<BigEndian>(0).unwrap();
        buf.write_u32::<BigEndian>(self.offset).unwrap();
        buf.write_u32::<BigEndian>(self.length).unwrap();
        buf.write_u32::<BigEndian>(self.element_type as u32).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();
        buf
    }

    /// Marshal the wire form followed by `value`, as used by write requests.
    ///
    /// The value must match the declared element type; strings are
    /// NUL-padded to the declared length, byte arrays must fill it exactly.
    pub fn marshal_with_value(&self, value: &MibValue) -> Result<Vec<u8>, OidError> {
        let mismatch = |value: &MibValue| OidError::TypeMismatch {
            expected: self.element_type,
            value: format!("{} {value}", value.type_name()),
        };
        let mut buf = self.marshal();
        match (self.element_type, value) {
            (OidType::Uint32, MibValue::Uint32(v)) => {
                buf.write_u32::<BigEndian>(*v).unwrap();
            }
            (OidType::Uint16, MibValue::Uint16(v)) => {
                buf.write_u16::<BigEndian>(*v).unwrap();
            }
            (OidType::Uint8, MibValue::Uint8(v)) if self.length == 1 => {
                buf.push(*v);
            }
            (OidType::Uint8, MibValue::Bytes(v)) => {
                if v.len() != self.length as usize {
                    return Err(mismatch(value));
                }
                buf.extend_from_slice(v);
            }
            (OidType::String, MibValue::Text(v)) => {
                if v.len() > self.length as usize {
                    return Err(mismatch(value));
                }
                buf.extend_from_slice(v.as_bytes());
                buf.resize(Self::WIRE_LEN + self.length as usize, 0);
            }
            (OidType::Bool, MibValue::Bool(v)) => {
                buf.push(u8::from(*v));
            }
            (
                OidType::Uint32 | OidType::Uint16 | OidType::Uint8 | OidType::String | OidType::Bool,
                _,
            ) => {
                return Err(mismatch(value));
            }
            (other, _) => return Err(OidError::UnsupportedType(other as u32)),
        }
        Ok(buf)
    }
}

/// A parsed OID response.
///
/// The reserved word is carried through so that echoed OIDs round-trip
/// bit-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidResponse {
    pub id: [u32; 3],
    pub offset: u32,
    pub length: u32,
    pub element_type: OidType,
    pub reserved: u32,
    pub value: MibValue,
}

/// Parse the payload of a successful MIB read response.
pub fn parse_response(data: &[u8]) -> Result<OidResponse, OidError> {
    if data.len() < Oid::WIRE_LEN {
        return Err(OidError::TooShort {
            expected: Oid::WIRE_LEN,
            actual: data.len(),
        });
    }
    let id = [
        BigEndian::read_u32(&data[0..4]),
        BigEndian::read_u32(&data[4..8]),
        BigEndian::read_u32(&data[8..12]),
    ];
    let offset = BigEndian::read_u32(&data[16..20]);
    let length = BigEndian::read_u32(&data[20..24]);
    let tag = BigEndian::read_u32(&data[24..28]);
    let reserved = BigEndian::read_u32(&data[28..32]);
    let payload = &data[Oid::WIRE_LEN..];

    let need = |n: usize| {
        if payload.len() < n {
            Err(OidError::TooShort {
                expected: Oid::WIRE_LEN + n,
                actual: data.len(),
            })
        } else {
            Ok(())
        }
    };

    let element_type = OidType::from_tag(tag).ok_or(OidError::UnsupportedType(tag))?;
    let value = match element_type {
        OidType::Uint32 => {
            need(4)?;
            MibValue::Uint32(BigEndian::read_u32(&payload[..4]))
        }
        // The firmware widens 16-bit values to a full word in responses.
        OidType::Uint16 => {
            need(4)?;
            MibValue::Uint32(BigEndian::read_u32(&payload[..4]))
        }
        OidType::Uint8 if length == 1 => {
            need(1)?;
            MibValue::Uint8(payload[0])
        }
        OidType::Uint8 => {
            need(length as usize)?;
            MibValue::Bytes(payload[..length as usize].to_vec())
        }
        OidType::String => {
            need(length as usize)?;
            let text = String::from_utf8_lossy(&payload[..length as usize]);
            MibValue::Text(text.trim_end_matches(['\0', ' ']).to_string())
        }
        OidType::Bool => {
            need(1)?;
            MibValue::Bool(payload[0] == 1)
        }
        other => return Err(OidError::UnsupportedType(other as u32)),
    };

    Ok(OidResponse {
        id,
        offset,
        length,
        element_type,
        reserved,
        value,
    })
}
