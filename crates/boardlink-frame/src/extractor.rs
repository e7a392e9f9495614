use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::header::{decode_header, HEADER_LEN, MARK_OPEN};

/// Default textual packet delimiter.
pub const DEFAULT_DELIMITER: &[u8] = b"\r\n";

/// Fixed grace period added to every armed-packet deadline.
const PENDING_GRACE: Duration = Duration::from_millis(100);
/// Per-byte arrival allowance. 2 ms/byte covers a 4800-baud link.
const PER_BYTE_ALLOWANCE_MS: u64 = 2;

#[derive(Debug)]
struct PendingFrame {
    length: usize,
    deadline: Instant,
}

/// Extracts complete packet payloads from an append-only byte stream.
///
/// Two framing modes coexist: length-prefixed binary packets announced by
/// the 9-byte signature, and delimiter-bounded text packets. Signature
/// matches take priority over the delimiter across the whole buffered
/// range. The pending state is non-`None` exactly while a partial
/// length-prefixed packet is being collected; it is cleared when the
/// packet completes or its deadline passes.
#[derive(Debug)]
pub struct FrameExtractor {
    buf: BytesMut,
    pending: Option<PendingFrame>,
    delimiter: Vec<u8>,
    binary_only: bool,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl FrameExtractor {
    pub fn new(delimiter: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: BytesMut::new(),
            pending: None,
            delimiter: delimiter.into(),
            binary_only: false,
        }
    }

    /// When set, the delimiter fallback is disabled: bytes that match no
    /// signature are held until more data allows another signature scan.
    pub fn set_binary_only(&mut self, on: bool) {
        self.binary_only = on;
    }

    pub fn binary_only(&self) -> bool {
        self.binary_only
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    /// Bytes buffered but not yet consumed by extraction.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard buffered bytes and any armed packet. Mode flags persist.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pending = None;
    }

    /// Append bytes and extract every packet that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.push_at(Instant::now(), data)
    }

    /// [`push`](Self::push) against an explicit clock, for callers that
    /// drive extraction from their own event loop (and for deterministic
    /// timeout tests).
    pub fn push_at(&mut self, now: Instant, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);

        // An armed packet whose deadline passed is abandoned; its already
        // buffered bytes stay and are re-scanned below.
        if let Some(pending) = &self.pending {
            if now > pending.deadline {
                debug!(
                    length = pending.length,
                    "armed packet exceeded its deadline, resynchronizing"
                );
                self.pending = None;
            }
        }

        let mut frames = Vec::new();
        let mut offset = 0usize;

        while self.buf.len() > offset {
            if let Some(pending) = &self.pending {
                let length = pending.length;
                if self.buf.len() - offset >= length {
                    frames.push(Bytes::copy_from_slice(&self.buf[offset..offset + length]));
                    offset += length;
                    self.pending = None;
                    continue;
                }
                // Not enough data yet; wait for the next push.
                break;
            }

            if self.buf.len() - offset >= HEADER_LEN {
                if let Some((consumed, length)) = self.find_signature(offset) {
                    offset += consumed;
                    trace!(length, "length-prefixed packet armed");
                    self.pending = Some(PendingFrame {
                        length: usize::from(length),
                        deadline: now
                            + PENDING_GRACE
                            + Duration::from_millis(PER_BYTE_ALLOWANCE_MS * u64::from(length)),
                    });
                    continue;
                }
            }

            if self.binary_only {
                break;
            }

            match find_subsequence(&self.buf[offset..], &self.delimiter) {
                Some(pos) => {
                    frames.push(Bytes::copy_from_slice(&self.buf[offset..offset + pos]));
                    offset += pos + self.delimiter.len();
                }
                None => break,
            }
        }

        if offset > 0 {
            self.buf.advance(offset);
        }
        frames
    }

    /// Scan for the next valid signature at or after `offset`.
    ///
    /// Returns `(consumed, length)` where `consumed` covers everything up
    /// to and including the signature, relative to `offset`. A rejected
    /// candidate window advances the scan by the full window, not one
    /// byte, so a valid signature overlapping a rejected window is skipped
    /// — callers must not rely on finding every overlapping match.
    fn find_signature(&self, offset: usize) -> Option<(usize, u16)> {
        let haystack = &self.buf[offset..];
        let mut search = 0usize;
        while haystack.len() > search {
            let found = haystack[search..]
                .iter()
                .position(|&b| b == MARK_OPEN)?
                + search;
            if found + HEADER_LEN > haystack.len() {
                return None;
            }
            search = found + HEADER_LEN;
            if let Some(length) = decode_header(&haystack[found..found + HEADER_LEN]) {
                return Some((search, length));
            }
        }
        None
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::encode_header;

    fn wire(payload: &[u8]) -> Vec<u8> {
        let mut out = encode_header(payload.len() as u16).to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn extracts_single_binary_packet() {
        let mut extractor = FrameExtractor::default();
        let frames = extractor.push(&wire(b"hello"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"hello");
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn reassembles_across_arbitrary_split_points() {
        let payload = b"split me anywhere";
        let stream = wire(payload);

        // Every split position, including inside the header.
        for split in 0..=stream.len() {
            let mut extractor = FrameExtractor::default();
            let mut frames = extractor.push(&stream[..split]);
            frames.extend(extractor.push(&stream[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].as_ref(), payload);
        }
    }

    #[test]
    fn byte_by_byte_feed_yields_one_packet() {
        let stream = wire(b"slow");
        let mut extractor = FrameExtractor::default();
        let mut frames = Vec::new();
        for &b in &stream {
            frames.extend(extractor.push(&[b]));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"slow");
    }

    #[test]
    fn extracts_multiple_packets_from_one_push() {
        let mut stream = wire(b"one");
        stream.extend_from_slice(&wire(b"two"));
        stream.extend_from_slice(b"text\r\n");

        let mut extractor = FrameExtractor::default();
        let frames = extractor.push(&stream);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref(), b"one");
        assert_eq!(frames[1].as_ref(), b"two");
        assert_eq!(frames[2].as_ref(), b"text");
    }

    #[test]
    fn delimiter_packets_extract_without_signature() {
        let mut extractor = FrameExtractor::default();
        let frames = extractor.push(b"hello\r\nworld\r\npartial");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"hello");
        assert_eq!(frames[1].as_ref(), b"world");
        // "partial" stays buffered until its delimiter arrives.
        assert_eq!(extractor.buffered(), 7);
    }

    #[test]
    fn garbage_before_signature_is_consumed() {
        let mut stream = b"##noise##".to_vec();
        stream.extend_from_slice(&wire(b"data"));

        let mut extractor = FrameExtractor::default();
        extractor.set_binary_only(true);
        let frames = extractor.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"data");
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn rejected_window_skips_full_nine_bytes() {
        // A '<' starts an invalid candidate window; a valid signature
        // begins one byte inside it. The resync rule skips the whole
        // window, so that signature is never seen.
        let mut stream = vec![MARK_OPEN];
        stream.extend_from_slice(&encode_header(3));
        stream.extend_from_slice(b"abc");

        let mut extractor = FrameExtractor::default();
        extractor.set_binary_only(true);
        let frames = extractor.push(&stream);
        assert!(frames.is_empty());
    }

    #[test]
    fn binary_only_holds_unmatched_bytes_back() {
        let mut extractor = FrameExtractor::default();
        extractor.set_binary_only(true);
        let frames = extractor.push(b"no packet here\r\n");
        assert!(frames.is_empty());
        assert_eq!(extractor.buffered(), 16);
    }

    #[test]
    fn zero_length_header_yields_empty_packet() {
        // '<' 0 '-' 0 '*' 0 '-' 0 '>' followed by a 2-byte trailer.
        let stream = [0x3C, 0x00, 0x2D, 0x00, 0x2A, 0x00, 0x2D, 0x00, 0x3E, 0x00, 0x00];
        let mut extractor = FrameExtractor::default();
        extractor.set_binary_only(true);
        let frames = extractor.push(&stream);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn abandoned_packet_unblocks_later_messages() {
        let start = Instant::now();
        let mut extractor = FrameExtractor::default();

        // Header announcing 5 bytes arrives; the payload never does.
        let frames = extractor.push_at(start, &encode_header(5));
        assert!(frames.is_empty());

        // Deadline is 100ms + 2ms*5; step well past it.
        let late = start + Duration::from_millis(500);
        let frames = extractor.push_at(late, b"ok\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"ok");
    }

    #[test]
    fn stale_partial_payload_prefixes_recovered_message() {
        let start = Instant::now();
        let mut extractor = FrameExtractor::default();

        extractor.push_at(start, &encode_header(8));
        extractor.push_at(start, b"xy");

        let late = start + Duration::from_secs(1);
        let frames = extractor.push_at(late, b"ok\r\n");
        // The two stranded payload bytes are re-scanned as text and end
        // up ahead of the fresh message, bounded by its delimiter.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"xyok");
    }

    #[test]
    fn armed_packet_survives_within_deadline() {
        let start = Instant::now();
        let mut extractor = FrameExtractor::default();

        extractor.push_at(start, &encode_header(4));
        let frames = extractor.push_at(start + Duration::from_millis(50), b"da");
        assert!(frames.is_empty());
        let frames = extractor.push_at(start + Duration::from_millis(90), b"ta");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"data");
    }

    #[test]
    fn signature_takes_priority_over_delimiter() {
        // Text and delimiter ahead of a signature are consumed as scan
        // garbage once a valid signature exists in the buffer.
        let mut stream = b"hi\r\n".to_vec();
        stream.extend_from_slice(&wire(b"bin"));

        let mut extractor = FrameExtractor::default();
        let frames = extractor.push(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"bin");
    }

    #[test]
    fn reset_discards_buffer_and_armed_state() {
        let mut extractor = FrameExtractor::default();
        extractor.set_binary_only(true);
        extractor.push(&encode_header(10));
        extractor.push(b"partial");
        extractor.reset();

        assert_eq!(extractor.buffered(), 0);
        assert!(extractor.binary_only());

        // A fresh packet extracts cleanly after reset.
        let frames = extractor.push(&wire(b"fresh"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), b"fresh");
    }

    #[test]
    fn custom_delimiter() {
        let mut extractor = FrameExtractor::new(b"\n".as_slice());
        let frames = extractor.push(b"a\nb\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), b"a");
        assert_eq!(frames[1].as_ref(), b"b");
    }
}
