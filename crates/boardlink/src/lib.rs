//! Typed packet exchange with microcontroller firmware.
//!
//! boardlink turns an unreliable byte stream (serial link, TCP bridge)
//! into CRC-validated, typed packets and back: C-layout struct encoding,
//! re-synchronizing stream framing, and async request/response
//! correlation.
//!
//! # Crate Structure
//!
//! - [`transport`] — the byte-link contract and an in-memory loopback pair
//! - [`structs`] — C-compatible binary struct layouts and values
//! - [`frame`] — packet extraction from the raw byte stream
//! - [`packet`] — the tagged wire format, CRC, and [`packet::PacketDevice`]

/// Re-export transport types.
pub mod transport {
    pub use boardlink_transport::*;
}

/// Re-export struct codec types.
pub mod structs {
    pub use boardlink_struct::*;
}

/// Re-export framing types.
pub mod frame {
    pub use boardlink_frame::*;
}

/// Re-export packet protocol types.
pub mod packet {
    pub use boardlink_packet::*;
}
