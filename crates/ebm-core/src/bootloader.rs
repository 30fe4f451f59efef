//! Bootloader engine: associate, stream firmware, boot.
//!
//! The on-chip bootloader is strictly synchronous: one request, one
//! response, retried on a one-second deadline. A freshly powered device
//! answers on the factory address until an associate exchange assigns it
//! the host-chosen one.

use std::io::BufRead;
use std::time::{Duration, Instant};

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fwpack::XorCipher;
use crate::protocol::boot::{BootFrame, BootFrameError};
use crate::protocol::constants::{
    BOOT_TYPE_ACK, BOOT_TYPE_ASSOCIATE_REQ, BOOT_TYPE_ASSOCIATE_RESP, BOOT_TYPE_DOWNLOAD_BEGIN,
    BOOT_TYPE_DOWNLOAD_END, BOOT_TYPE_DOWNLOAD_RECORD, DEFAULT_DEVICE_ADDR, RECV_BUF_LEN,
};
use crate::srec::{self, SrecError};
use crate::transport::{FrameTransport, MacAddr, TransportError};

/// Attempts per exchange before giving up.
pub const MAX_TRIES: u32 = 5;

/// Read deadline per attempt.
pub const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Checksum transmitted in the `DownloadEnd` exchange.
///
/// What the device expects this CRC-32 to cover is not known; the vendor
/// bootloader accepts this fixed value for every observed firmware, so it
/// ships as the default and can be overridden through [`BootConfig`].
pub const DOWNLOAD_END_CRC_PLACEHOLDER: u32 = 0x0279_2767;

#[derive(Error, Debug)]
pub enum BootError {
    #[error("no response after {MAX_TRIES} tries")]
    TimedOut,
    #[error("device reported status {0}")]
    DeviceReported(u8),
    #[error("unexpected response type {actual:#06x}, expected {expected:#06x}")]
    UnexpectedResponseType { expected: u16, actual: u16 },
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
    #[error("invalid firmware record: {0}")]
    Srec(#[from] SrecError),
    #[error("frame error: {0}")]
    Frame(#[from] BootFrameError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for the download path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    /// CRC-32 sent in the `DownloadEnd` payload.
    pub download_end_crc: u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            download_end_crc: DOWNLOAD_END_CRC_PLACEHOLDER,
        }
    }
}

impl BootConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, BootError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), BootError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Synchronous bootloader client on one transport.
pub struct Bootloader<'a, T: FrameTransport + ?Sized> {
    transport: &'a T,
    device: MacAddr,
    sequence: u16,
    config: BootConfig,
}

impl<'a, T: FrameTransport + ?Sized> Bootloader<'a, T> {
    pub fn new(transport: &'a T, config: BootConfig) -> Self {
        Self {
            transport,
            device: DEFAULT_DEVICE_ADDR,
            sequence: 1,
            config,
        }
    }

    /// Run one request/response exchange.
    ///
    /// The sequence number is stamped once; retransmissions reuse it. Each
    /// attempt sends the frame and reads until the deadline, dropping
    /// responses with foreign sequence numbers.
    fn exchange(&mut self, mut frame: BootFrame) -> Result<BootFrame, BootError> {
        frame.sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        let raw = frame.encode()?;

        for attempt in 1..=MAX_TRIES {
            self.transport.send_to(&raw, self.device)?;
            let deadline = Instant::now() + READ_DEADLINE;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.transport.set_read_deadline(Some(remaining))?;
                let mut buf = [0u8; RECV_BUF_LEN];
                let n = match self.transport.recv(&mut buf) {
                    Ok(n) => n,
                    Err(TransportError::Timeout) => {
                        debug!(attempt, "no response within deadline, retrying");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                };
                let res = match BootFrame::decode(&buf[..n]) {
                    Ok(res) => res,
                    Err(e) => {
                        warn!(error = %e, "dropping unparseable frame");
                        continue;
                    }
                };
                if res.sequence != frame.sequence {
                    warn!(
                        got = res.sequence,
                        want = frame.sequence,
                        "bad sequence number, dropping"
                    );
                    continue;
                }
                return Ok(res);
            }
        }
        Err(BootError::TimedOut)
    }

    /// Exchange and require an ack-shaped response of `expected` type with
    /// a zero status byte.
    fn exchange_expect(&mut self, frame: BootFrame, expected: u16) -> Result<BootFrame, BootError> {
        let res = self.exchange(frame)?;
        if res.frame_type != expected {
            return Err(BootError::UnexpectedResponseType {
                expected,
                actual: res.frame_type,
            });
        }
        match res.payload.first() {
            None => Err(BootError::MalformedResponse("empty ack payload")),
            Some(&status) if status != 0 => Err(BootError::DeviceReported(status)),
            Some(_) => Ok(res),
        }
    }

    /// Associate with a fresh device and assign it `addr`.
    ///
    /// Subsequent exchanges are addressed to the assigned MAC.
    pub fn associate(&mut self, addr: MacAddr) -> Result<(), BootError> {
        let mut payload = Vec::with_capacity(22);
        payload.write_u32::<BigEndian>(0x0002_0304).unwrap();
        payload.extend_from_slice(&addr.octets());
        for word in 1u32..=3 {
            payload.write_u32::<BigEndian>(word).unwrap();
        }
        self.exchange_expect(
            BootFrame::new(BOOT_TYPE_ASSOCIATE_REQ, payload),
            BOOT_TYPE_ASSOCIATE_RESP,
        )?;
        info!(addr = %addr, "device associated");
        self.device = addr;
        Ok(())
    }

    fn download_begin(&mut self) -> Result<(), BootError> {
        let payload = vec![
            0xba, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x0a, 0x0b, 0x0c, 0x0d,
        ];
        self.exchange_expect(
            BootFrame::new(BOOT_TYPE_DOWNLOAD_BEGIN, payload),
            BOOT_TYPE_ACK,
        )?;
        Ok(())
    }

    fn download_record(&mut self, record: Vec<u8>) -> Result<(), BootError> {
        self.exchange_expect(
            BootFrame::new(BOOT_TYPE_DOWNLOAD_RECORD, record),
            BOOT_TYPE_ACK,
        )?;
        Ok(())
    }

    fn download_end(&mut self) -> Result<(), BootError> {
        let mut payload = Vec::with_capacity(8);
        payload
            .write_u32::<BigEndian>(self.config.download_end_crc)
            .unwrap();
        payload.extend_from_slice(&[0xf4, 0xee, 0x00, 0xdd]);
        self.exchange_expect(BootFrame::new(BOOT_TYPE_DOWNLOAD_END, payload), BOOT_TYPE_ACK)?;
        Ok(())
    }

    /// Associate with the modem, assign it `addr`, stream the S-record
    /// firmware and boot it.
    ///
    /// Only `S3` records are uploaded; other record types in the input are
    /// skipped. Record payloads are obfuscated with one keystream whose
    /// phase runs across record boundaries.
    pub fn download_and_boot<R: BufRead>(
        &mut self,
        addr: MacAddr,
        firmware: R,
    ) -> Result<(), BootError> {
        self.associate(addr)?;
        self.download_begin()?;

        let mut cipher = XorCipher::new();
        let mut records = 0u32;
        for line in firmware.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (typ, payload) = srec::parse_generic(&line)?;
            if typ != 3 {
                continue;
            }
            if payload.len() < 4 {
                warn!(record = records, "S3 record without an address, skipping");
                continue;
            }
            let (record_addr, data) = payload.split_at(4);

            let mut composed = Vec::with_capacity(8 + data.len());
            composed.extend_from_slice(record_addr);
            composed
                .write_u32::<BigEndian>((data.len() / 4) as u32)
                .unwrap();
            composed.extend_from_slice(data);
            cipher.apply(&mut composed);

            self.download_record(composed)?;
            records += 1;
        }
        info!(records, "firmware streamed");

        self.download_end()?;
        info!("device booting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fwpack::XOR_KEY;
    use crate::transport::MockTransport;

    const ASSIGNED: MacAddr = MacAddr([0xde, 0x21, 0x65, 0x01, 0x02, 0x03]);

    fn ack(sequence: u16, frame_type: u16) -> Vec<u8> {
        BootFrame {
            sequence,
            frame_type,
            payload: vec![0],
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_associate_retargets_to_assigned_addr() {
        let mock = MockTransport::new();
        mock.push_frame(&ack(1, BOOT_TYPE_ASSOCIATE_RESP));
        mock.push_frame(&ack(2, BOOT_TYPE_ACK));

        let mut boot = Bootloader::new(&mock, BootConfig::default());
        boot.associate(ASSIGNED).unwrap();
        boot.download_begin().unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, DEFAULT_DEVICE_ADDR);
        assert_eq!(sent[1].0, ASSIGNED);

        let req = BootFrame::decode(&sent[0].1).unwrap();
        assert_eq!(req.sequence, 1);
        assert_eq!(req.frame_type, BOOT_TYPE_ASSOCIATE_REQ);
        let mut expected = vec![0x00, 0x02, 0x03, 0x04];
        expected.extend_from_slice(&ASSIGNED.octets());
        expected.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]);
        assert_eq!(req.payload, expected);
    }

    #[test]
    fn test_exchange_gives_up_after_five_tries() {
        let mock = MockTransport::new();
        let mut boot = Bootloader::new(&mock, BootConfig::default());
        let err = boot.associate(ASSIGNED).unwrap_err();
        assert!(matches!(err, BootError::TimedOut));
        assert_eq!(mock.sent_count(), 5);
        // All five transmissions carry the original sequence number.
        for (_, raw) in mock.sent() {
            assert_eq!(BootFrame::decode(&raw).unwrap().sequence, 1);
        }
    }

    #[test]
    fn test_foreign_sequence_numbers_are_dropped() {
        let mock = MockTransport::new();
        mock.push_frame(&ack(99, BOOT_TYPE_ASSOCIATE_RESP));
        mock.push_frame(&ack(1, BOOT_TYPE_ASSOCIATE_RESP));

        let mut boot = Bootloader::new(&mock, BootConfig::default());
        boot.associate(ASSIGNED).unwrap();
        assert_eq!(mock.sent_count(), 1);
    }

    #[test]
    fn test_nonzero_ack_status() {
        let mock = MockTransport::new();
        mock.push_frame(
            &BootFrame {
                sequence: 1,
                frame_type: BOOT_TYPE_ASSOCIATE_RESP,
                payload: vec![3],
            }
            .encode()
            .unwrap(),
        );
        let mut boot = Bootloader::new(&mock, BootConfig::default());
        assert!(matches!(
            boot.associate(ASSIGNED),
            Err(BootError::DeviceReported(3))
        ));
    }

    #[test]
    fn test_unexpected_response_type() {
        let mock = MockTransport::new();
        mock.push_frame(&ack(1, BOOT_TYPE_ACK));
        let mut boot = Bootloader::new(&mock, BootConfig::default());
        assert!(matches!(
            boot.associate(ASSIGNED),
            Err(BootError::UnexpectedResponseType {
                expected: BOOT_TYPE_ASSOCIATE_RESP,
                actual: BOOT_TYPE_ACK,
            })
        ));
    }

    #[test]
    fn test_download_obfuscates_with_running_keystream() {
        let mock = MockTransport::new();
        for seq in 1..=6u16 {
            let frame_type = if seq == 1 {
                BOOT_TYPE_ASSOCIATE_RESP
            } else {
                BOOT_TYPE_ACK
            };
            mock.push_frame(&ack(seq, frame_type));
        }

        let data_a = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        let data_b = [0x99u8, 0xaa, 0xbb, 0xcc];
        let firmware = format!(
            "{}{}{}{}",
            srec::s0("test firmware"),
            srec::s3(0x1000_0000, &data_a),
            srec::s3(0x1000_0008, &data_b),
            srec::s7(0),
        );

        let mut boot = Bootloader::new(&mock, BootConfig::default());
        boot.download_and_boot(ASSIGNED, firmware.as_bytes()).unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 5); // associate, begin, two records, end

        // De-obfuscating both record payloads with one keystream must give
        // back address || word count || data for each record in turn.
        let rec1 = BootFrame::decode(&sent[2].1).unwrap();
        let rec2 = BootFrame::decode(&sent[3].1).unwrap();
        assert_eq!(rec1.frame_type, BOOT_TYPE_DOWNLOAD_RECORD);
        let mut stream = rec1.payload.clone();
        stream.extend_from_slice(&rec2.payload);
        for (i, b) in stream.iter_mut().enumerate() {
            *b ^= XOR_KEY[i % XOR_KEY.len()];
        }
        let mut expected = vec![0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02];
        expected.extend_from_slice(&data_a);
        expected.extend_from_slice(&[0x10, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01]);
        expected.extend_from_slice(&data_b);
        assert_eq!(stream, expected);

        // DownloadEnd carries the configured CRC and trailer.
        let end = BootFrame::decode(&sent[4].1).unwrap();
        assert_eq!(end.frame_type, BOOT_TYPE_DOWNLOAD_END);
        assert_eq!(end.payload, vec![0x02, 0x79, 0x27, 0x67, 0xf4, 0xee, 0x00, 0xdd]);
    }
}
