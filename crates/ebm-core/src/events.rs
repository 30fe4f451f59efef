//! Event surface for asynchronous device traffic.
//!
//! The operational session emits console text, logger records and
//! lifecycle changes as typed events so embedding applications can route
//! them without being coupled to the reactor. Events are never errors.

use std::fmt;

/// Events emitted by an operational session.
#[derive(Debug, Clone)]
pub enum EbmEvent {
    /// Raw console output from the device firmware.
    ConsoleOutput { data: Vec<u8> },
    /// The modem changed state (logger record type 1).
    ModemState { code: u32, name: String },
    /// The firmware reported an SOC message error (logger record type 4).
    SocError { code: u32, name: String },
    /// Any other logger record, delivered raw.
    LoggerRecord { log_type: u16, payload: Vec<u8> },
    /// A response arrived with a sequence number other than the in-flight
    /// request's. The response is delivered anyway.
    SequenceMismatch { expected: u32, actual: u32 },
    /// A request is being retransmitted.
    Retransmit { sequence: u32 },
    /// The device closed the session.
    DeviceDisconnected,
    /// The receive path failed; the session is going down.
    ReceiverClosed { error: String },
}

impl fmt::Display for EbmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EbmEvent::ConsoleOutput { data } => {
                write!(f, "console: {}", String::from_utf8_lossy(data))
            }
            EbmEvent::ModemState { code, name } => write!(f, "modem status {code}: {name}"),
            EbmEvent::SocError { code, name } => write!(f, "error {code}: {name}"),
            EbmEvent::LoggerRecord { log_type, payload } => {
                write!(f, "log type {log_type}: {}", hex::encode(payload))
            }
            EbmEvent::SequenceMismatch { expected, actual } => {
                write!(f, "sequence number mismatch: {expected} != {actual}")
            }
            EbmEvent::Retransmit { sequence } => write!(f, "retransmitting request {sequence}"),
            EbmEvent::DeviceDisconnected => write!(f, "device disconnect"),
            EbmEvent::ReceiverClosed { error } => write!(f, "receive path closed: {error}"),
        }
    }
}

/// Observer trait for receiving session events.
pub trait EbmObserver: Send + Sync {
    fn on_event(&self, event: &EbmEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl EbmObserver for NullObserver {
    fn on_event(&self, _event: &EbmEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl EbmObserver for TracingObserver {
    fn on_event(&self, event: &EbmEvent) {
        match event {
            EbmEvent::ConsoleOutput { .. }
            | EbmEvent::ModemState { .. }
            | EbmEvent::LoggerRecord { .. } => tracing::info!("{event}"),
            EbmEvent::SocError { .. }
            | EbmEvent::SequenceMismatch { .. }
            | EbmEvent::DeviceDisconnected
            | EbmEvent::ReceiverClosed { .. } => tracing::warn!("{event}"),
            EbmEvent::Retransmit { .. } => tracing::debug!("{event}"),
        }
    }
}
