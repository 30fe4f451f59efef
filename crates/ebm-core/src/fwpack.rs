//! Metanoia firmware pack parsing and de-obfuscation.
//!
//! A pack carries several firmwares behind one 512-byte header. The body of
//! each firmware is XOR-obfuscated with a fixed 128-byte key and consists of
//! address/length/data records terminated by a sentinel address. The decoder
//! selects the MT-G5321 firmware and emits it as S-records.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::srec;

/// Container signature at offset 0.
pub const PACK_SIGNATURE: u32 = 0x6123_2321;

/// Container version at offset 16.
pub const PACK_VERSION: u32 = 0x0002_0000;

/// Per-firmware signature selecting the MT-G5321 image.
pub const MT5321_FIRMWARE_SIGNATURE: u32 = 0x2321_0010;

/// Address terminating the record stream of a de-obfuscated firmware.
pub const RECORD_SENTINEL: u32 = 0xffee_ddcc;

const PACK_HEADER_LEN: usize = 512;
const META_SLOT_LEN: usize = 32;

/// Obfuscation key, cycled by byte position. Treated as an opaque blob taken
/// from the vendor tooling; do not try to derive or compress it.
pub const XOR_KEY: [u8; 128] = [
    0xb4, 0xdf, 0x15, 0x73, 0x69, 0xbe, 0x2a, 0xe7,
    0xd3, 0x7c, 0x55, 0xce, 0xa6, 0xf8, 0xab, 0x9d,
    0x4d, 0xf1, 0x57, 0x3b, 0x9b, 0xe2, 0xae, 0x76,
    0x37, 0xc5, 0x5c, 0xed, 0x6f, 0x8a, 0xb9, 0xda,
    0xdf, 0x15, 0x73, 0xb4, 0xbe, 0x2a, 0xe7, 0x69,
    0x7c, 0x55, 0xce, 0xd3, 0xf8, 0xab, 0x9d, 0xa6,
    0xf1, 0x57, 0x3b, 0x4d, 0xe2, 0xae, 0x76, 0x9b,
    0xc5, 0x5c, 0xed, 0x37, 0x8a, 0xb9, 0xda, 0x6f,
    0x15, 0x73, 0xb4, 0xdf, 0x2a, 0xe7, 0x69, 0xbe,
    0x55, 0xce, 0xd3, 0x7c, 0xab, 0x9d, 0xa6, 0xf8,
    0x57, 0x3b, 0x4d, 0xf1, 0xae, 0x76, 0x9b, 0xe2,
    0x5c, 0xed, 0x37, 0xc5, 0xb9, 0xda, 0x6f, 0x8a,
    0x73, 0xb4, 0xdf, 0x15, 0xe7, 0x69, 0xbe, 0x2a,
    0xce, 0xd3, 0x7c, 0x55, 0x9d, 0xa6, 0xf8, 0xab,
    0x3b, 0x4d, 0xf1, 0x57, 0x76, 0x9b, 0xe2, 0xae,
    0xed, 0x37, 0xc5, 0x5c, 0xda, 0x6f, 0x8a, 0xb9,
];

/// Keystream position over [`XOR_KEY`].
///
/// The same stream obfuscates bootloader uploads and de-obfuscates pack
/// bodies; the position carries across calls so record boundaries do not
/// reset the key phase.
#[derive(Debug, Default)]
pub struct XorCipher {
    pos: usize,
}

impl XorCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// XOR `buf` in place against the key, advancing the stream position.
    pub fn apply(&mut self, buf: &mut [u8]) {
        for b in buf {
            *b ^= XOR_KEY[self.pos % XOR_KEY.len()];
            self.pos += 1;
        }
    }
}

#[derive(Error, Debug)]
pub enum FwpackError {
    #[error("bad pack signature {actual:#010x}")]
    BadSignature { actual: u32 },
    #[error("unknown pack version {actual:#010x}")]
    BadVersion { actual: u32 },
    #[error("{count} firmware slots do not fit the pack header")]
    TooManyFirmwares { count: u32 },
    #[error("no MT-G5321 firmware signature in pack")]
    FirmwareNotFound,
    #[error("firmware body ends before the in-stream signature")]
    TruncatedBody,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata slot of one firmware inside the pack header.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareMeta {
    pub signature: u32,
    pub size: u32,
    pub start_offset: u32,
    pub record_count: u32,
}

impl FirmwareMeta {
    fn parse(slot: &[u8]) -> Self {
        Self {
            signature: BigEndian::read_u32(&slot[0..4]),
            size: BigEndian::read_u32(&slot[4..8]),
            start_offset: BigEndian::read_u32(&slot[16..20]),
            record_count: BigEndian::read_u32(&slot[24..28]),
        }
    }
}

/// Locate the MT-G5321 firmware in a pack header.
///
/// Validates signature, version and slot count, then scans the metadata
/// slots for [`MT5321_FIRMWARE_SIGNATURE`].
pub fn find_firmware(header: &[u8; 512]) -> Result<FirmwareMeta, FwpackError> {
    let signature = BigEndian::read_u32(&header[0..4]);
    if signature != PACK_SIGNATURE {
        return Err(FwpackError::BadSignature { actual: signature });
    }
    let version = BigEndian::read_u32(&header[16..20]);
    if version != PACK_VERSION {
        return Err(FwpackError::BadVersion { actual: version });
    }
    let count = BigEndian::read_u32(&header[4..8]);
    if count as usize * META_SLOT_LEN >= PACK_HEADER_LEN {
        return Err(FwpackError::TooManyFirmwares { count });
    }
    for i in 1..=count as usize {
        let slot = &header[i * META_SLOT_LEN..(i + 1) * META_SLOT_LEN];
        let meta = FirmwareMeta::parse(slot);
        if meta.signature == MT5321_FIRMWARE_SIGNATURE {
            return Ok(meta);
        }
    }
    Err(FwpackError::FirmwareNotFound)
}

/// Extract the MT-G5321 firmware from `pack` into `out` as S-records.
///
/// Emits one `S0` provenance comment and one `S3` record per firmware
/// record. The stored in-stream checksum and the CRCs computed over the
/// body are surfaced as diagnostics only; nothing past the header checks
/// is fatal.
pub fn extract_firmware<R: Read + Seek, W: Write>(
    pack: &mut R,
    out: &mut W,
) -> Result<(), FwpackError> {
    let mut header = [0u8; 512];
    pack.read_exact(&mut header)?;
    let meta = find_firmware(&header)?;
    info!(
        start_offset = meta.start_offset,
        size = meta.size,
        record_count = meta.record_count,
        "found MT-G5321 firmware"
    );

    pack.seek(SeekFrom::Start(meta.start_offset as u64))?;
    let mut body = pack.take(meta.size as u64);

    let stream_signature = body.read_u32::<BigEndian>().map_err(|_| FwpackError::TruncatedBody)?;
    let stored_checksum = body.read_u32::<BigEndian>().map_err(|_| FwpackError::TruncatedBody)?;
    debug!(
        signature = format!("{stream_signature:#010x}"),
        checksum = format!("{stored_checksum:#010x}"),
        "in-stream firmware prologue"
    );

    let mut raw_crc = crc32fast::Hasher::new();
    let mut cipher = XorCipher::new();
    let mut fw_data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = body.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        raw_crc.update(&chunk[..n]);
        let start = fw_data.len();
        fw_data.extend_from_slice(&chunk[..n]);
        cipher.apply(&mut fw_data[start..]);
    }

    debug!(crc = format!("{:#010x}", raw_crc.finalize()), "CRC over obfuscated body");
    debug!(
        crc = format!("{:#010x}", crc32fast::hash(&fw_data)),
        "CRC over de-obfuscated body"
    );
    if fw_data.len() >= 4 {
        debug!(
            crc = format!("{:#010x}", crc32fast::hash(&fw_data[..fw_data.len() - 4])),
            "CRC over de-obfuscated body minus trailer"
        );
    }

    out.write_all(srec::s0("Generated from firmware_package.b by ebm-fwutil").as_bytes())?;

    let mut data_crc = crc32fast::Hasher::new();
    let mut emitted = 0u32;
    let mut ptr = 0usize;
    loop {
        let Some(prologue) = fw_data.get(ptr..ptr + 8) else {
            warn!("record stream ended without sentinel");
            break;
        };
        let addr = BigEndian::read_u32(&prologue[0..4]);
        if addr == RECORD_SENTINEL {
            break;
        }
        let word_len = BigEndian::read_u32(&prologue[4..8]);
        if prologue[4..7] != [0, 0, 0] {
            warn!(
                addr = format!("{addr:#010x}"),
                reserved = hex::encode(&prologue[4..7]),
                "data in reserved record bytes"
            );
        }
        let data_len = word_len as usize * 4;
        ptr += 8;
        let Some(data) = fw_data.get(ptr..ptr + data_len) else {
            warn!(
                addr = format!("{addr:#010x}"),
                len = data_len,
                "record data overruns firmware body"
            );
            break;
        };
        data_crc.update(data);
        out.write_all(srec::s3(addr, data).as_bytes())?;
        emitted += 1;
        ptr += data_len;
    }

    debug!(crc = format!("{:#010x}", data_crc.finalize()), "CRC over record data");
    if emitted != meta.record_count {
        debug!(
            emitted,
            declared = meta.record_count,
            "record count differs from pack metadata"
        );
    }
    Ok(())
}
