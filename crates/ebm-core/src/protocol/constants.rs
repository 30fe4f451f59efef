//! Wire constants for the EBM protocol.
//!
//! Status codes and message types come from the wire specification; the
//! log-type, error and modem-state tables are reverse-engineered from the
//! MT-G5321 firmware.

use crate::transport::MacAddr;

/// EtherType carrying both EBM sub-protocols.
pub const ETHERTYPE_EBM: u16 = 0x6120;

/// Factory address the bootloader answers on before association.
pub const DEFAULT_DEVICE_ADDR: MacAddr = MacAddr([0x00, 0x0e, 0xad, 0x33, 0x44, 0x55]);

/// Prefix of host-assigned device addresses; the low three bytes are random.
pub const ASSIGNED_ADDR_PREFIX: [u8; 3] = [0xde, 0x21, 0x65];

/// Frames shorter than this are zero-padded on the wire.
pub const MIN_FRAME_LEN: usize = 46;

/// Largest payload either header shape can carry on a 1500-byte MTU link.
pub const MAX_PAYLOAD_LEN: usize = 1494;

/// Receive buffer size: MTU plus the Ethernet II header.
pub const RECV_BUF_LEN: usize = 1514;

// ============================================================================
// Operational message types
// ============================================================================

pub const TYPE_READ_MEMORY: u8 = 0x01;
pub const TYPE_WRITE_MEMORY: u8 = 0x02;
pub const TYPE_READ_MIB: u8 = 0x06;
pub const TYPE_WRITE_MIB: u8 = 0x07;
pub const TYPE_SEARCH_DEVICE: u8 = 0x30;
pub const TYPE_CONNECT: u8 = 0x31;
pub const TYPE_REBOOT_UPGRADE: u8 = 0x33;
pub const TYPE_CONSOLE_INPUT: u8 = 0x40;
pub const TYPE_SDP_DISCONNECT: u8 = 0x50;

// Asynchronous, device-initiated.
pub const TYPE_CONSOLE_OUTPUT: u8 = 0x60;
pub const TYPE_LOGGER_OUTPUT: u8 = 0x61;
pub const TYPE_DEVICE_DISCONNECT: u8 = 0x70;

pub const TYPE_READ_MEMORY_RESP: u8 = 0x81;
pub const TYPE_WRITE_MEMORY_RESP: u8 = 0x82;
pub const TYPE_READ_MIB_RESP: u8 = 0x86;
pub const TYPE_WRITE_MIB_RESP: u8 = 0x87;
pub const TYPE_SEARCH_DEVICE_RESP: u8 = 0xb0;
pub const TYPE_CONNECT_RESP: u8 = 0xb1;
pub const TYPE_DISCONNECT_RESP: u8 = 0xb2;

/// Human-readable name of an operational message type.
///
/// Unknown values are preserved as `UNK_<decimal>` for diagnostics.
pub fn type_name(msg_type: u8) -> String {
    match msg_type {
        TYPE_READ_MEMORY => "READ_MEMORY".into(),
        TYPE_WRITE_MEMORY => "WRITE_MEMORY".into(),
        TYPE_READ_MIB => "READ_MIB".into(),
        TYPE_WRITE_MIB => "WRITE_MIB".into(),
        TYPE_SEARCH_DEVICE => "SEARCH_DEVICE".into(),
        TYPE_CONNECT => "CONNECT".into(),
        TYPE_REBOOT_UPGRADE => "REBOOT_UPGRADE".into(),
        TYPE_CONSOLE_INPUT => "CONSOLE_INPUT".into(),
        TYPE_SDP_DISCONNECT => "SDP_DISCONNECT".into(),
        TYPE_CONSOLE_OUTPUT => "CONSOLE_OUTPUT".into(),
        TYPE_LOGGER_OUTPUT => "LOGGER_OUTPUT".into(),
        TYPE_DEVICE_DISCONNECT => "DEVICE_DISCONNECT".into(),
        TYPE_READ_MEMORY_RESP => "READ_MEMORY_RESP".into(),
        TYPE_WRITE_MEMORY_RESP => "WRITE_MEMORY_RESP".into(),
        TYPE_READ_MIB_RESP => "READ_MIB_RESP".into(),
        TYPE_WRITE_MIB_RESP => "WRITE_MIB_RESP".into(),
        TYPE_SEARCH_DEVICE_RESP => "SEARCH_DEVICE_RESP".into(),
        TYPE_CONNECT_RESP => "CONNECT_RESP".into(),
        TYPE_DISCONNECT_RESP => "DISCONNECT_RESP".into(),
        other => format!("UNK_{other}"),
    }
}

// ============================================================================
// Status codes
// ============================================================================

pub const STATUS_OK: u8 = 0;
pub const STATUS_GTPI_NOT_FOUND: u8 = 1;
pub const STATUS_INVALID_ACCESSING: u8 = 2;
pub const STATUS_LENGTH_MISMATCH: u8 = 3;
pub const STATUS_INVALID_VALUE: u8 = 4;
pub const STATUS_PSD_ERROR: u8 = 5;
pub const STATUS_RMSC_ERROR: u8 = 6;
pub const STATUS_CONNECTED: u8 = 7;
pub const STATUS_LENGTH_EXCEEDS_PAYLOAD_SIZE: u8 = 16;
pub const STATUS_INCOMPLETE_CMD: u8 = 17;
pub const STATUS_ACCESS_DENIED: u8 = 18;
pub const STATUS_DISCONNECTED: u8 = 177;
pub const STATUS_QUESTION: u8 = 224;
pub const STATUS_ANSWER_CORRECT: u8 = 225;
pub const STATUS_ANSWER_WRONG: u8 = 226;
pub const STATUS_OCCUPIED: u8 = 227;
pub const STATUS_FORCED_CONNECT: u8 = 228;
pub const STATUS_DEFAULT: u8 = 255;

/// Human-readable name of a status code, `UNK_<decimal>` for unknown ones.
pub fn status_name(status: u8) -> String {
    match status {
        STATUS_OK => "OK".into(),
        STATUS_GTPI_NOT_FOUND => "GTPI_NOT_FOUND".into(),
        STATUS_INVALID_ACCESSING => "INVALID_ACCESSING".into(),
        STATUS_LENGTH_MISMATCH => "LENGTH_MISMATCH".into(),
        STATUS_INVALID_VALUE => "INVALID_VALUE".into(),
        STATUS_PSD_ERROR => "PSD_ERROR".into(),
        STATUS_RMSC_ERROR => "RMSC_ERROR".into(),
        STATUS_CONNECTED => "CONNECTED".into(),
        STATUS_LENGTH_EXCEEDS_PAYLOAD_SIZE => "LENGTH_EXCEEDS_PAYLOAD_SIZE".into(),
        STATUS_INCOMPLETE_CMD => "INCOMPLETE_CMD".into(),
        STATUS_ACCESS_DENIED => "ACCESS_DENIED".into(),
        STATUS_DISCONNECTED => "DISCONNECTED".into(),
        STATUS_QUESTION => "QUESTION".into(),
        STATUS_ANSWER_CORRECT => "ANSWER_CORRECT".into(),
        STATUS_ANSWER_WRONG => "ANSWER_WRONG".into(),
        STATUS_OCCUPIED => "OCCUPIED".into(),
        STATUS_FORCED_CONNECT => "FORCED_CONNECT".into(),
        STATUS_DEFAULT => "DEFAULT_STATUS".into(),
        other => format!("UNK_{other}"),
    }
}

// ============================================================================
// Bootloader frame types
// ============================================================================

pub const BOOT_TYPE_ASSOCIATE_REQ: u16 = 0x01;
pub const BOOT_TYPE_ASSOCIATE_RESP: u16 = 0x02;
pub const BOOT_TYPE_DOWNLOAD_BEGIN: u16 = 0x11;
pub const BOOT_TYPE_DOWNLOAD_RECORD: u16 = 0x12;
pub const BOOT_TYPE_DOWNLOAD_END: u16 = 0x13;
pub const BOOT_TYPE_ACK: u16 = 0x14;

// ============================================================================
// Logger record layout (LOGGER_OUTPUT payload)
// ============================================================================

/// Byte offset of the 16-bit log type within a logger payload.
pub const LOGGER_TYPE_OFFSET: usize = 20;

/// Byte offset of the 32-bit status/error code within a logger payload.
pub const LOGGER_CODE_OFFSET: usize = 24;

pub const LOG_TYPE_MODEM_STATUS: u16 = 1;
pub const LOG_TYPE_SOC_MESSAGE_ERROR: u16 = 4;

/// Name of a logger record type, `UNK_<decimal>` for unknown ones.
pub fn log_type_name(log_type: u16) -> String {
    match log_type {
        0 => "eyebox".into(),
        1 => "modem status".into(),
        2 => "training SNR".into(),
        3 => "showtime SNR".into(),
        4 => "SOC message error".into(),
        5 => "OLR".into(),
        6 => "overheating".into(),
        7 => "snapshot".into(),
        other => format!("UNK_{other}"),
    }
}

/// Name of a firmware error code, `UNK_<decimal>` for unknown ones.
pub fn error_name(code: u32) -> String {
    match code {
        4 => "synchro 1-1 failed".into(),
        7 => "o-signature failed".into(),
        8 => "synchro 1 failed".into(),
        9 => "timeline sequencer timeout".into(),
        10 => "SOC message error".into(),
        11 => "high BER event".into(),
        16 => "high BER event 2".into(),
        32 => "pilot low SNR".into(),
        33 => "RMC low SNR".into(),
        35 => "ETR < ETR_MIN".into(),
        other => format!("UNK_{other}"),
    }
}

/// Name of a modem state, `UNK_<decimal>` for unknown ones.
pub fn modem_state_name(state: u32) -> String {
    match state {
        0 => "idle".into(),
        1 => "silent".into(),
        2 => "init handshake".into(),
        3 => "init train".into(),
        4 => "showtime".into(),
        5 => "selftest".into(),
        6 => "unit fail".into(),
        7 => "deactivating 1".into(),
        8 => "deactivating 2".into(),
        9 => "init handshake only".into(),
        10 => "init train only".into(),
        12 => "quick showtime".into(),
        13 => "AFE TX test".into(),
        14 => "AFE RX test".into(),
        15 => "AFE loopback".into(),
        other => format!("UNK_{other}"),
    }
}
