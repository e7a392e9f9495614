use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::SerialLink;

/// In-memory byte link: everything written to one end arrives on the other.
///
/// Stands in for a real serial port in tests and examples. Chunks are
/// delivered exactly as written — callers that want to exercise
/// reassembly should split their writes.
pub struct LoopbackLink {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    open: bool,
}

/// Create a connected pair of loopback links.
pub fn loopback_pair() -> (LoopbackLink, LoopbackLink) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    (
        LoopbackLink {
            tx: b_tx,
            rx: Some(a_rx),
            open: true,
        },
        LoopbackLink {
            tx: a_tx,
            rx: Some(b_rx),
            open: true,
        },
    )
}

impl SerialLink for LoopbackLink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn incoming(&mut self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        self.rx.take().ok_or(TransportError::ReceiverTaken)
    }

    fn close(&mut self) {
        debug!("loopback link closed");
        self.open = false;
        self.rx = None;
    }
}
