//! ebm-core: Ethernet Boot Management client for the Metanoia MT-G5321.
//!
//! The MT-G5321 G.fast modem chip is managed over raw Ethernet II frames
//! (EtherType `0x6120`) using two proprietary sub-protocols:
//!
//! - **Bootloader**: strictly synchronous request/response against the
//!   on-chip bootloader, used to associate with a nameless device, stream
//!   obfuscated firmware records and trigger boot.
//! - **Operational**: a long-lived session with a challenge/response
//!   connect handshake, sequenced exchanges multiplexed with unsolicited
//!   device events, and a typed MIB variable namespace.
//!
//! # Architecture
//!
//! - **Protocol**: the two frame codecs and the wire dictionaries
//! - **Transport**: raw-frame abstraction (AF_PACKET, mock)
//! - **Srec / Fwpack**: the on-disk firmware formats
//! - **Mib**: typed OID codec plus the known-variable catalogue
//! - **Bootloader**: the download engine
//! - **Session**: the operational reactor
//! - **Events**: observer surface for asynchronous device traffic
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ebm_core::bootloader::{BootConfig, Bootloader};
//! use ebm_core::events::TracingObserver;
//! use ebm_core::mib::catalog;
//! use ebm_core::session::Session;
//! use ebm_core::transport::{MacAddr, PacketTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(PacketTransport::open("eth0")?);
//!     let addr = MacAddr([0xde, 0x21, 0x65, 0x01, 0x02, 0x03]);
//!
//!     let firmware = std::io::BufReader::new(std::fs::File::open("firmware.srec")?);
//!     Bootloader::new(transport.as_ref(), BootConfig::default())
//!         .download_and_boot(addr, firmware)?;
//!
//!     let session = Session::new(transport, addr, Arc::new(TracingObserver));
//!     session.dial()?;
//!     println!("ticks: {}", session.read_mib(&catalog::TICKS)?);
//!     Ok(())
//! }
//! ```

pub mod bootloader;
pub mod events;
pub mod fwpack;
pub mod mib;
pub mod protocol;
pub mod session;
pub mod srec;
pub mod transport;

// Re-exports for convenience
pub use bootloader::{BootConfig, BootError, Bootloader};
pub use events::{EbmEvent, EbmObserver, NullObserver, TracingObserver};
pub use fwpack::{FwpackError, XorCipher, extract_firmware};
pub use mib::{MibValue, Oid, OidError, OidType};
pub use protocol::{BootFrame, Message};
pub use session::{Session, SessionError, default_challenge_handler};
pub use transport::{FrameTransport, MacAddr, MockTransport, TransportError};
