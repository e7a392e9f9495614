use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;
use crate::extractor::FrameExtractor;
use crate::header::{encode_header, HEADER_LEN};

/// `tokio_util::codec` adapter over [`FrameExtractor`].
///
/// Lets a framed transport be driven as `Framed<T, FrameStreamCodec>`:
/// decoding drains the read buffer through the extractor (so both framing
/// modes and timeout resynchronization apply), encoding prepends the
/// 9-byte length signature.
#[derive(Debug, Default)]
pub struct FrameStreamCodec {
    extractor: FrameExtractor,
    ready: VecDeque<Bytes>,
}

impl FrameStreamCodec {
    pub fn new(extractor: FrameExtractor) -> Self {
        Self {
            extractor,
            ready: VecDeque::new(),
        }
    }

    pub fn extractor_mut(&mut self) -> &mut FrameExtractor {
        &mut self.extractor
    }
}

impl Decoder for FrameStreamCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if !src.is_empty() {
            let chunk = src.split_to(src.len());
            self.ready.extend(self.extractor.push(&chunk));
        }
        Ok(self.ready.pop_front())
    }
}

impl Encoder<Bytes> for FrameStreamCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = u16::try_from(item.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: item.len(),
            max: usize::from(u16::MAX),
        })?;
        dst.reserve(HEADER_LEN + item.len());
        dst.extend_from_slice(&encode_header(len));
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_roundtrip() {
        let mut codec = FrameStreamCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"ping"), &mut wire).unwrap();

        let frame = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"ping");
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn decode_queues_multiple_frames() {
        let mut codec = FrameStreamCodec::default();
        let mut wire = BytesMut::new();
        codec.encode(Bytes::from_static(b"a"), &mut wire).unwrap();
        codec.encode(Bytes::from_static(b"bb"), &mut wire).unwrap();

        assert_eq!(codec.decode(&mut wire).unwrap().unwrap().as_ref(), b"a");
        assert_eq!(codec.decode(&mut wire).unwrap().unwrap().as_ref(), b"bb");
        assert!(codec.decode(&mut wire).unwrap().is_none());
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut codec = FrameStreamCodec::default();
        let mut full = BytesMut::new();
        codec.encode(Bytes::from_static(b"later"), &mut full).unwrap();

        let mut first = full.split_to(6);
        assert!(codec.decode(&mut first).unwrap().is_none());
        let frame = codec.decode(&mut full).unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"later");
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut codec = FrameStreamCodec::default();
        let mut wire = BytesMut::new();
        let err = codec
            .encode(Bytes::from(vec![0u8; 70_000]), &mut wire)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }
}
