/// Errors that can occur when encoding frames.
///
/// Extraction itself never errors: malformed signature windows are skipped
/// and abandoned packets are re-synchronized away, affecting only which
/// bytes are consumed.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds what the 16-bit length header can announce.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while driving a framed stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
