/// Errors that can occur on a byte link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link has been closed (peer gone or `close()` called).
    #[error("link closed")]
    Closed,

    /// The incoming byte channel was already taken by another consumer.
    #[error("incoming byte channel already taken")]
    ReceiverTaken,

    /// An I/O error occurred on the underlying device.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
