//! Frame transport abstraction.
//!
//! Defines the `FrameTransport` trait over which both protocol engines
//! exchange raw L2 frames, allowing different implementations (AF_PACKET,
//! mock, etc.).

use std::time::Duration;

use thiserror::Error;

use super::MacAddr;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open socket: {0}")]
    OpenFailed(String),

    #[error("no interface named {0}")]
    InterfaceNotFound(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("read deadline expired")]
    Timeout,

    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract raw-frame interface.
///
/// Implementations carry one EtherType on one interface; frames are
/// addressed by destination MAC only.
pub trait FrameTransport: Send + Sync {
    /// Send one frame to `dest`.
    fn send_to(&self, frame: &[u8], dest: MacAddr) -> Result<(), TransportError>;

    /// Receive one frame into `buf`, returning its length.
    ///
    /// Blocks until a frame arrives, the configured read deadline expires
    /// (`Timeout`) or the transport is torn down (`Closed`).
    fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Set the deadline applied to each subsequent [`recv`](Self::recv)
    /// call. `None` blocks indefinitely.
    fn set_read_deadline(&self, timeout: Option<Duration>) -> Result<(), TransportError>;
}
