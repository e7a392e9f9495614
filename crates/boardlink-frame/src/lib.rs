//! Packet extraction from a continuously appended byte stream.
//!
//! Serial links deliver bytes in arbitrary chunks and occasionally lose
//! some. This crate turns that stream back into discrete packets using two
//! framing modes that coexist on one stream:
//!
//! - a fixed 9-byte length-prefix signature (`'<' n0 '-' n1 '*' n2 '-' n3 '>'`,
//!   four length nibbles, most significant first) announcing a binary
//!   payload of up to 65535 bytes;
//! - a textual delimiter (default `\r\n`) bounding plain-text packets.
//!
//! A matched signature "arms" the extractor for the announced payload. If
//! the payload does not complete within its deadline the armed state is
//! abandoned and the buffered bytes are re-scanned, so a truncated packet
//! cannot wedge the stream.

pub mod error;
pub mod extractor;
pub mod header;

#[cfg(feature = "async")]
pub mod codec;

pub use error::{FrameError, Result};
pub use extractor::{FrameExtractor, DEFAULT_DELIMITER};
pub use header::{decode_header, encode_header, HEADER_LEN};

#[cfg(feature = "async")]
pub use codec::FrameStreamCodec;
