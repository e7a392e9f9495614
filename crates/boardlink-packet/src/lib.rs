//! Typed packet protocol for talking to device firmware.
//!
//! This is the top layer of boardlink. On top of the stream framer it
//! adds:
//!
//! - a CRC-16 trailer on every packet (polynomial 0x1021, initial value
//!   0x0000, most-significant byte first);
//! - a compact tagged wire format for text, typed scalar, and typed array
//!   payloads, with raw JSON passing through untouched;
//! - [`PacketDevice`], which feeds transport bytes through the framer,
//!   validates checksums, and correlates replies with async waiters:
//!   a FIFO queue of one-shot waiters (first claim wins) followed by
//!   unconditional fan-out to persistent subscribers.

pub mod crc;
pub mod device;
pub mod error;
pub mod types;
pub mod wire;

pub use crc::{crc16, validate, CRC_LEN};
pub use device::{DeviceConfig, MatchRule, PacketDevice, Subscription};
pub use error::{PacketError, Result};
pub use types::{DataType, DecodedValue};
pub use wire::{encode, parse, ParsedPacket, Payload, ScalarArray, TypedValue};
