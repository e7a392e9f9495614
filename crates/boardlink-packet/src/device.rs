use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use boardlink_frame::{encode_header, FrameError, FrameExtractor};
use boardlink_transport::SerialLink;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::crc::{append_crc, validate, CRC_LEN};
use crate::error::{PacketError, Result};
use crate::wire::{parse, ParsedPacket, Payload};

/// Device-level configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Delimiter for text-mode packets, appended to terminated output and
    /// used by the framer's fallback scan.
    pub delimiter: Vec<u8>,
    /// Disable the delimiter fallback entirely; only length-prefixed
    /// packets are extracted.
    pub binary_only: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            delimiter: b"\r\n".to_vec(),
            binary_only: false,
        }
    }
}

struct Waiter {
    id: u64,
    /// A claiming waiter stops propagation of the packet it receives;
    /// a non-claiming one passes it on down the queue.
    exclusive: bool,
    tx: oneshot::Sender<Result<Bytes>>,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

struct State {
    extractor: FrameExtractor,
    waiters: VecDeque<Waiter>,
    subscribers: Vec<Subscriber>,
    link: Option<Box<dyn SerialLink>>,
    pump: Option<JoinHandle<()>>,
    next_id: u64,
}

struct Shared {
    config: DeviceConfig,
    state: Mutex<State>,
}

/// A packet-level connection to one device.
///
/// Incoming transport bytes — delivered by the pump spawned in
/// [`open`](PacketDevice::open), or pushed directly through
/// [`feed`](PacketDevice::feed) — run through the framer, are
/// CRC-validated, and are then dispatched: first through the FIFO queue of
/// one-shot waiters, where the first claiming waiter stops propagation,
/// then fanned out unconditionally to every persistent subscriber.
/// Delivery order is extraction order.
///
/// Cloning yields another handle to the same device.
#[derive(Clone)]
pub struct PacketDevice {
    shared: Arc<Shared>,
}

impl Default for PacketDevice {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}

impl PacketDevice {
    pub fn new(config: DeviceConfig) -> Self {
        let mut extractor = FrameExtractor::new(config.delimiter.clone());
        extractor.set_binary_only(config.binary_only);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    extractor,
                    waiters: VecDeque::new(),
                    subscribers: Vec::new(),
                    link: None,
                    pump: None,
                    next_id: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// Attach a transport and start pumping its incoming bytes through
    /// the receive path. Must be called inside a tokio runtime.
    pub fn open<L: SerialLink>(&self, mut link: L) -> Result<()> {
        let mut rx = link.incoming()?;
        let shared = Arc::clone(&self.shared);
        let pump = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                shared.feed(&chunk);
            }
            debug!("byte pump stopped: link channel closed");
        });

        let mut state = self.shared.lock_state();
        if let Some(old) = state.pump.take() {
            old.abort();
        }
        if let Some(mut old) = state.link.take() {
            old.close();
        }
        state.link = Some(Box::new(link));
        state.pump = Some(pump);
        Ok(())
    }

    /// Release the transport. Pending waiters are left to time out.
    pub fn close(&self) {
        let mut state = self.shared.lock_state();
        if let Some(mut link) = state.link.take() {
            link.close();
        }
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock_state().link.is_some()
    }

    /// Push raw transport bytes through the receive path.
    ///
    /// This is the single notification path: extraction, validation, and
    /// dispatch all happen synchronously inside this call.
    pub fn feed(&self, bytes: &[u8]) {
        self.shared.feed(bytes);
    }

    /// Discard any buffered, not-yet-framed bytes.
    pub fn reset_buffer(&self) {
        self.shared.lock_state().extractor.reset();
    }

    /// Write raw bytes to the attached transport.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.shared.lock_state();
        let link = state.link.as_mut().ok_or(PacketError::NotOpen)?;
        link.write(bytes)?;
        Ok(())
    }

    /// Write raw text followed by the configured delimiter.
    pub fn write_text(&self, text: &str) -> Result<()> {
        let mut out = text.as_bytes().to_vec();
        out.extend_from_slice(&self.shared.config.delimiter);
        self.write(&out)
    }

    /// Build a complete outbound packet: payload, CRC trailer, then
    /// either the configured delimiter (`terminated`, for text-oriented
    /// transports) or the 9-byte length header sized to payload + CRC.
    pub fn encode_packet(&self, payload: &Payload, terminated: bool) -> Result<Vec<u8>> {
        let mut body = crate::wire::encode(payload)?;
        append_crc(&mut body);

        if terminated {
            body.extend_from_slice(&self.shared.config.delimiter);
            return Ok(body);
        }

        let len = u16::try_from(body.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: body.len(),
            max: usize::from(u16::MAX),
        })?;
        let mut out = encode_header(len).to_vec();
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Encode a payload with the length header and write it out.
    pub fn write_packet(&self, payload: &Payload) -> Result<()> {
        let bytes = self.encode_packet(payload, false)?;
        self.write(&bytes)
    }

    /// Encode a payload delimiter-terminated and write it out.
    pub fn write_packet_terminated(&self, payload: &Payload) -> Result<()> {
        let bytes = self.encode_packet(payload, true)?;
        self.write(&bytes)
    }

    /// Wait for the next validated packet, claiming it exclusively.
    pub async fn recv_raw(&self, timeout: Duration) -> Result<Bytes> {
        self.recv_raw_with(timeout, true).await
    }

    /// Wait for the next validated packet. With `exclusive` false the
    /// packet is passed on to later waiters and subscribers after this
    /// one observes it.
    pub async fn recv_raw_with(&self, timeout: Duration, exclusive: bool) -> Result<Bytes> {
        let (id, mut rx) = {
            let mut state = self.shared.lock_state();
            let id = state.next_id;
            state.next_id += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, exclusive, tx });
            (id, rx)
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PacketError::Closed),
            Err(_) => {
                // Deterministic unregistration; a packet that raced the
                // deadline into the channel still wins.
                self.shared.lock_state().waiters.retain(|w| w.id != id);
                match rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(PacketError::Timeout(timeout)),
                }
            }
        }
    }

    /// Wait for the next packet and parse it as JSON.
    pub async fn recv_json(&self, timeout: Duration) -> Result<serde_json::Value> {
        let raw = self.recv_raw(timeout).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Wait for the next packet and parse it as a tagged or JSON payload.
    pub async fn recv_packet(&self, timeout: Duration) -> Result<ParsedPacket> {
        let raw = self.recv_raw(timeout).await?;
        parse(&raw)
    }

    /// Register a persistent subscriber. It observes every dispatched
    /// packet (and each batch checksum error) until dropped; it never
    /// claims packets from the one-shot queue.
    pub fn subscribe(&self) -> Subscription {
        let mut state = self.shared.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber { id, tx });
        Subscription {
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait until a packet parses and matches `rule`.
    ///
    /// Runs as a persistent subscriber: it does not claim packets from
    /// one-shot waiters. Unparseable packets are skipped; a batch
    /// checksum error or the timeout ends the wait, unregistering the
    /// subscriber in every case.
    pub async fn wait_for(&self, rule: &MatchRule, timeout: Duration) -> Result<ParsedPacket> {
        let mut subscription = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, subscription.recv()).await {
                Err(_) => return Err(PacketError::Timeout(timeout)),
                Ok(None) => return Err(PacketError::Closed),
                Ok(Some(Err(err))) => return Err(err),
                Ok(Some(Ok(raw))) => {
                    let Ok(parsed) = parse(&raw) else {
                        continue;
                    };
                    if rule.matches(&parsed) {
                        return Ok(parsed);
                    }
                }
            }
        }
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.shared.lock_state().waiters.len()
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.shared.lock_state().subscribers.len()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("device state poisoned")
    }

    fn feed(&self, bytes: &[u8]) {
        let mut state = self.lock_state();
        let packets = state.extractor.push(bytes);
        if packets.is_empty() {
            return;
        }

        let mut valid = Vec::with_capacity(packets.len());
        for packet in &packets {
            match validate(packet) {
                Ok(_) => valid.push(packet.slice(..packet.len() - CRC_LEN)),
                Err(_) => trace!(len = packet.len(), "dropping packet with bad checksum"),
            }
        }

        if valid.is_empty() {
            // Nothing in the batch validated: one error signal for the
            // whole receive call.
            warn!(count = packets.len(), "receive batch failed checksum validation");
            Self::deliver_error(&mut state);
            return;
        }

        for payload in valid {
            Self::deliver(&mut state, payload);
        }
    }

    fn deliver(state: &mut State, payload: Bytes) {
        while let Some(waiter) = state.waiters.pop_front() {
            let exclusive = waiter.exclusive;
            // A dropped receiver (timed-out waiter racing removal) just
            // falls through to the next in line.
            if waiter.tx.send(Ok(payload.clone())).is_ok() && exclusive {
                trace!("packet claimed by one-shot waiter");
                return;
            }
        }
        state
            .subscribers
            .retain(|sub| sub.tx.send(Ok(payload.clone())).is_ok());
    }

    fn deliver_error(state: &mut State) {
        while let Some(waiter) = state.waiters.pop_front() {
            let _ = waiter.tx.send(Err(PacketError::Checksum));
        }
        state
            .subscribers
            .retain(|sub| sub.tx.send(Err(PacketError::Checksum)).is_ok());
    }
}

/// Handle for a persistent subscriber; unregisters on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Result<Bytes>>,
    shared: Arc<Shared>,
}

impl Subscription {
    /// The next dispatched payload or batch error; `None` once the
    /// device is gone.
    pub async fn recv(&mut self) -> Option<Result<Bytes>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        state.subscribers.retain(|s| s.id != self.id);
    }
}

/// Predicate for [`PacketDevice::wait_for`], evaluated against the parsed
/// packet's named-value form.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Matches when any of these names is present.
    AnyKey(Vec<String>),
    /// Matches when any of these key/value pairs is present and equal.
    KeyValue(Vec<(String, serde_json::Value)>),
    /// Matches when the whole value form is equal.
    Exact(serde_json::Value),
}

impl MatchRule {
    pub fn matches(&self, packet: &ParsedPacket) -> bool {
        let value = packet.to_json();
        match self {
            MatchRule::AnyKey(keys) => value
                .as_object()
                .is_some_and(|obj| keys.iter().any(|key| obj.contains_key(key))),
            MatchRule::KeyValue(pairs) => value
                .as_object()
                .is_some_and(|obj| pairs.iter().any(|(key, want)| obj.get(key) == Some(want))),
            MatchRule::Exact(want) => &value == want,
        }
    }
}
