use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// A bidirectional byte link to a device.
///
/// This is the fundamental I/O contract of boardlink. Implementations wrap
/// whatever actually carries the bytes — a serial port, a TCP bridge, a
/// BLE UART — and expose two halves:
///
/// - an outbound half: [`write`](SerialLink::write) pushes raw bytes
///   toward the device;
/// - an inbound half: [`incoming`](SerialLink::incoming) hands out the
///   channel on which arriving byte chunks are delivered. Chunk boundaries
///   carry no meaning; the framing layer reassembles packets regardless of
///   how the link splits them.
///
/// The channel is handed out once. `incoming` returns
/// `TransportError::ReceiverTaken` on subsequent calls.
pub trait SerialLink: Send + 'static {
    /// Write raw bytes to the device.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Take the stream of byte chunks arriving from the device.
    ///
    /// The channel closes when the link closes.
    fn incoming(&mut self) -> Result<mpsc::UnboundedReceiver<Bytes>>;

    /// Release the link. Writes after this fail with `Closed`.
    fn close(&mut self);
}
