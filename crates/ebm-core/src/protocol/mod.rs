//! Protocol module - EBM wire definitions.

pub mod boot;
pub mod constants;
pub mod message;

pub use boot::{BootFrame, BootFrameError};
pub use constants::*;
pub use message::{Message, MessageError};
