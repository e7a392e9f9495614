//! Byte-link transport abstraction for boardlink.
//!
//! A device is reachable over some bidirectional byte link — a UART, a USB
//! CDC port, a TCP serial bridge. This crate defines the contract the rest
//! of boardlink consumes ([`SerialLink`]) and an in-memory loopback pair
//! used by tests and examples. Actual serial-port implementations live
//! outside this workspace; anything that can write bytes and deliver
//! arriving chunks can drive a packet device.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::{loopback_pair, LoopbackLink};
pub use traits::SerialLink;
