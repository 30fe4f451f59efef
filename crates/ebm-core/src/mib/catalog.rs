//! Catalogue of known MT-G5321 MIB variables.
//!
//! Identifiers and types were recovered from the vendor management tool;
//! names follow the G.fast vocabulary (SNR, DTU, FEC, showtime) where the
//! variable maps onto a standard quantity.

use byteorder::{BigEndian, ByteOrder};

use super::{AccessMode, Oid, OidType};

// Ethernet-side packet counters.
pub const TX_PACKETS: Oid = Oid::uint32(11, 27, 21);
pub const TX_BYTES: Oid = Oid::uint32(11, 27, 20);
pub const RX_ERRORS: Oid = Oid::uint32(11, 27, 5);
pub const RX_PACKETS: Oid = Oid::uint32(11, 27, 1);
pub const RX_BYTES: Oid = Oid::uint32(11, 27, 0);

/// Free-running tick counter; a stuck modem stops incrementing it.
pub const TICKS: Oid = Oid::uint32(11, 21, 0);

pub const LOG_CONTROL: Oid = Oid {
    access: AccessMode::ReadWrite,
    ..Oid::uint32(11, 17, 4)
};
pub const CONSOLE_CONTROL: Oid = Oid {
    access: AccessMode::ReadWrite,
    ..Oid::uint32(11, 17, 3)
};

// Line performance counters.
pub const MEASURED_TIME_US: Oid = Oid::uint32(11, 14, 44);
pub const MEASURED_TIME_DS: Oid = Oid::uint32(11, 14, 43);
pub const ERROR_FREE_BITS_US: Oid = Oid::uint32(11, 14, 42);
pub const ERROR_FREE_BITS_DS: Oid = Oid::uint32(11, 14, 41);
pub const FAR_END_RETRANSMITTED_DTU: Oid = Oid::uint32(11, 14, 40);
pub const NEAR_END_RETRANSMITTED_DTU: Oid = Oid::uint32(11, 14, 39);
pub const FAR_END_UNCORRECTED_DTU: Oid = Oid::uint32(11, 14, 38);
pub const NEAR_END_UNCORRECTED_DTU: Oid = Oid::uint32(11, 14, 37);
pub const FAR_END_CODE_VIOLATIONS: Oid = Oid::uint32(11, 14, 36);
pub const NEAR_END_CODE_VIOLATIONS: Oid = Oid::uint32(11, 14, 35);

pub const FAILED_FULL_INITS: Oid = Oid::uint32(11, 14, 20);
pub const FULL_INITS: Oid = Oid::uint32(11, 14, 19);
pub const FAR_END_UNAVAILABLE_SECONDS: Oid = Oid::uint32(11, 14, 18);
pub const NEAR_END_UNAVAILABLE_SECONDS: Oid = Oid::uint32(11, 14, 17);
pub const FAR_END_LOSS_OF_RMC_SECONDS: Oid = Oid::uint32(11, 14, 16);
pub const NEAR_END_LOSS_OF_RMC_SECONDS: Oid = Oid::uint32(11, 14, 15);
pub const FAR_END_LOSS_OF_SIGNAL_SECONDS: Oid = Oid::uint32(11, 14, 14);
pub const NEAR_END_LOSS_OF_SIGNAL_SECONDS: Oid = Oid::uint32(11, 14, 13);
pub const FAR_END_SEVERELY_ERRORED_SECONDS: Oid = Oid::uint32(11, 14, 12);
pub const NEAR_END_SEVERELY_ERRORED_SECONDS: Oid = Oid::uint32(11, 14, 11);
pub const FAR_END_ERRORED_SECONDS: Oid = Oid::uint32(11, 14, 10);
pub const NEAR_END_ERRORED_SECONDS: Oid = Oid::uint32(11, 14, 9);
pub const FAR_END_LOSS_OF_POWER: Oid = Oid::uint32(11, 14, 8);
pub const NEAR_END_LOSS_OF_POWER: Oid = Oid::uint32(11, 14, 7);
pub const FAR_END_LOSS_OF_MARGIN: Oid = Oid::uint32(11, 14, 6);
pub const NEAR_END_LOSS_OF_MARGIN: Oid = Oid::uint32(11, 14, 5);
pub const FAR_END_LOSS_OF_RMC: Oid = Oid::uint32(11, 14, 4);
pub const NEAR_END_LOSS_OF_RMC: Oid = Oid::uint32(11, 14, 3);
pub const FAR_END_LOSS_OF_SIGNAL: Oid = Oid::uint32(11, 14, 2);
pub const NEAR_END_LOSS_OF_SIGNAL: Oid = Oid::uint32(11, 14, 1);

/// Current modem state, see `modem_state_name`.
pub const MODEM_STATUS: Oid = Oid::uint8(11, 10, 1);
pub const CMD_STATUS: Oid = Oid {
    element_type: OidType::Bool,
    access: AccessMode::ReadWrite,
    ..Oid::uint8(11, 10, 0)
};
pub const REPEAT_COMMAND: Oid = Oid {
    access: AccessMode::Write,
    ..Oid::uint8(11, 1, 2)
};
pub const HOST_COMMAND: Oid = Oid {
    access: AccessMode::Write,
    ..Oid::uint8(11, 1, 0)
};

// Identifying info. The NT-side strings are writable.
pub const NETWORK_TERMINATION_SERIAL: Oid = Oid::string(10, 12, 9, 32);
pub const NETWORK_TERMINATION_VENDOR: Oid = Oid::string(10, 12, 7, 8);
pub const DPU_SERIAL: Oid = Oid::string(10, 12, 8, 32);
pub const DPU_VENDOR: Oid = Oid::string(10, 12, 6, 8);
pub const FTUR_SELFTEST: Oid = Oid::string(10, 12, 5, 4);
pub const FTUO_SELFTEST: Oid = Oid::string(10, 12, 4, 4);
pub const XTU_REMOTE_VERSION: Oid = Oid::string(10, 12, 3, 16);
pub const XTU_CENTRAL_VERSION: Oid = Oid::string(10, 12, 2, 16);
pub const XTU_REMOTE_VENDOR: Oid = Oid::string(10, 12, 1, 8);
pub const XTU_CENTRAL_VENDOR: Oid = Oid::string(10, 12, 0, 8);

// FEC parameters.
pub const FEC_DTU_US: Oid = Oid::uint8(10, 10, 21);
pub const FEC_DTU_DS: Oid = Oid::uint8(10, 10, 20);
pub const FEC_REDUNDANCY_US: Oid = Oid::uint8(10, 10, 19);
pub const FEC_REDUNDANCY_DS: Oid = Oid::uint8(10, 10, 18);
pub const FEC_LENGTH_US: Oid = Oid::uint8(10, 10, 17);
pub const FEC_LENGTH_DS: Oid = Oid::uint8(10, 10, 16);

// Data rates.
pub const ATTAINABLE_NET_DATA_RATE_US: Oid = Oid::uint32(10, 10, 7);
pub const ATTAINABLE_NET_DATA_RATE_DS: Oid = Oid::uint32(10, 10, 6);
pub const EXPECTED_THROUGHPUT_US: Oid = Oid::uint32(10, 10, 3);
pub const EXPECTED_THROUGHPUT_DS: Oid = Oid::uint32(10, 10, 2);
pub const NET_DATA_RATE_US: Oid = Oid::uint32(10, 10, 1);
pub const NET_DATA_RATE_DS: Oid = Oid::uint32(10, 10, 0);
pub const MAX_NET_DATA_RATE_US: Oid = Oid::uint16(10, 1, 1);
pub const MAX_NET_DATA_RATE_DS: Oid = Oid::uint16(10, 1, 0);

// Per-subcarrier SNR windows; the arrays exceed one frame, so each half is
// read through a 1024-element window.
pub const SNR_PER_SUBCARRIER_US_LOW: Oid = Oid {
    length: 1024,
    ..Oid::uint8(10, 9, 17)
};
pub const SNR_PER_SUBCARRIER_US_HIGH: Oid = Oid {
    length: 1024,
    offset: 1024,
    ..Oid::uint8(10, 9, 17)
};
pub const SNR_SUBCARRIER_GROUP_SIZE_US: Oid = Oid::uint8(10, 9, 16);
pub const SNR_PER_SUBCARRIER_DS_LOW: Oid = Oid {
    length: 1024,
    ..Oid::uint8(10, 9, 14)
};
pub const SNR_PER_SUBCARRIER_DS_HIGH: Oid = Oid {
    length: 1024,
    offset: 1024,
    ..Oid::uint8(10, 9, 14)
};
pub const SNR_SUBCARRIER_GROUP_SIZE_DS: Oid = Oid::uint8(10, 9, 13);

pub const POWER_US: Oid = Oid::uint16(10, 9, 9);
pub const POWER_DS: Oid = Oid::uint16(10, 9, 8);
pub const SNR_MARGIN_US: Oid = Oid::uint16(10, 9, 5);
pub const SNR_MARGIN_DS: Oid = Oid::uint16(10, 9, 4);

/// A G.994.1 vendor ID as carried by the identity strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorId {
    pub country_code: u16,
    pub provider_code: String,
    pub vendor_info: u16,
}

impl VendorId {
    /// Split an 8-byte vendor-ID string into its fields. Returns `None`
    /// for strings of the wrong length.
    pub fn parse(vid: &str) -> Option<Self> {
        let raw = vid.as_bytes();
        if raw.len() != 8 {
            return None;
        }
        Some(Self {
            country_code: BigEndian::read_u16(&raw[0..2]),
            provider_code: String::from_utf8_lossy(&raw[2..6]).into_owned(),
            vendor_info: BigEndian::read_u16(&raw[6..8]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windowed_reads_share_an_identifier() {
        assert_eq!(SNR_PER_SUBCARRIER_US_LOW.id, SNR_PER_SUBCARRIER_US_HIGH.id);
        assert_eq!(SNR_PER_SUBCARRIER_US_HIGH.offset, 1024);
        assert_eq!(SNR_PER_SUBCARRIER_US_HIGH.length, 1024);
    }

    #[test]
    fn test_vendor_id_parse() {
        let vid = VendorId::parse("\u{1}\u{2}META\u{3}\u{4}").unwrap();
        assert_eq!(vid.country_code, 0x0102);
        assert_eq!(vid.provider_code, "META");
        assert_eq!(vid.vendor_info, 0x0304);
        assert!(VendorId::parse("short").is_none());
    }
}
