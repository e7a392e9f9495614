use std::time::Duration;

/// Errors that can occur in the packet protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] boardlink_transport::TransportError),

    /// Struct codec error while building or reading a wire header.
    #[error("struct error: {0}")]
    Struct(#[from] boardlink_struct::StructError),

    /// Frame-level error while assembling an outbound packet.
    #[error("frame error: {0}")]
    Frame(#[from] boardlink_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No transport is attached.
    #[error("device is not open")]
    NotOpen,

    /// Every packet in a receive batch failed checksum validation.
    #[error("checksum validation failed for the receive batch")]
    Checksum,

    /// A packet ended before its declared contents.
    #[error("packet too short while reading {0}")]
    Truncated(&'static str),

    /// The buffer starts with neither JSON braces nor a known marker.
    #[error("unrecognized packet marker")]
    BadMarker,

    /// A value type tag outside the protocol table.
    #[error("unknown value type tag {0:#04x}")]
    UnknownType(u8),

    /// A name, payload, or element count exceeds its 1-byte wire field.
    #[error("{what} too long for the wire format ({len} bytes, max 255)")]
    TooLong { what: &'static str, len: usize },

    /// A struct array payload with no elements cannot be typed.
    #[error("struct array payload is empty")]
    EmptyStructArray,

    /// Struct array elements must share one size.
    #[error("struct array elements differ in size")]
    MismatchedStructSizes,

    /// No matching packet arrived within the requested window.
    #[error("no matching packet within {0:?}")]
    Timeout(Duration),

    /// The device was closed or dropped while waiting.
    #[error("device closed while waiting")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PacketError>;
