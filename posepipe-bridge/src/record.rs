//! Fixed-size wire record exchanged between publisher and subscribers
//!
//! Layout (big-endian, 16 bytes, no padding):
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 4    | sequence (u32) |
//! | 4      | 4    | value (f32)    |
//! | 8      | 8    | timestamp (ms) |

use crate::error::BridgeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const RECORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRecord {
    pub sequence: u32,
    pub value: f32,
    pub timestamp_ms: u64,
}

impl SignalRecord {
    pub fn new(sequence: u32, value: f32, timestamp_ms: u64) -> Self {
        Self {
            sequence,
            value,
            timestamp_ms,
        }
    }

    /// Stamp a record with the current wall-clock time
    pub fn now(sequence: u32, value: f32) -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self::new(sequence, value, millis)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RECORD_LEN);
        buf.put_u32(self.sequence);
        buf.put_f32(self.value);
        buf.put_u64(self.timestamp_ms);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_LEN);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one record. A short buffer or a non-finite value is rejected.
    pub fn decode(mut bytes: &[u8]) -> Result<Self, BridgeError> {
        if bytes.len() < RECORD_LEN {
            return Err(BridgeError::Protocol(format!(
                "Record needs {} bytes, got {}",
                RECORD_LEN,
                bytes.len()
            )));
        }

        let sequence = bytes.get_u32();
        let value = bytes.get_f32();
        let timestamp_ms = bytes.get_u64();

        if !value.is_finite() {
            return Err(BridgeError::Protocol(format!(
                "Record {} carries non-finite value {}",
                sequence, value
            )));
        }

        Ok(Self::new(sequence, value, timestamp_ms))
    }
}

/// Reassembles records from a byte stream that may split them arbitrarily
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: BytesMut,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(RECORD_LEN * 4),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes held back waiting for the rest of a record
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete record, if any. A malformed record still consumes its
    /// 16 bytes so decoding stays aligned.
    pub fn next_record(&mut self) -> Option<Result<SignalRecord, BridgeError>> {
        if self.buffer.len() < RECORD_LEN {
            return None;
        }
        let frame = self.buffer.split_to(RECORD_LEN);
        Some(SignalRecord::decode(&frame))
    }
}

/// Serial-number comparison so a wrapped sequence still counts as newer
pub fn is_newer(candidate: u32, last: u32) -> bool {
    (candidate.wrapping_sub(last) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_layout_is_big_endian() {
        let record = SignalRecord::new(1, 1.0, 2);
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), RECORD_LEN);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..8], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let err = SignalRecord::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_nan() {
        let record = SignalRecord::new(7, f32::NAN, 0);
        let err = SignalRecord::decode(&record.to_bytes()).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_decoder_buffers_partial_reads() {
        let first = SignalRecord::new(10, 0.5, 1000).to_bytes();
        let second = SignalRecord::new(11, 0.75, 1001).to_bytes();
        let mut stream = first.to_vec();
        stream.extend_from_slice(&second);

        let mut decoder = RecordDecoder::new();
        decoder.extend(&stream[..5]);
        assert!(decoder.next_record().is_none());
        assert_eq!(decoder.buffered(), 5);

        decoder.extend(&stream[5..20]);
        let decoded = decoder.next_record().unwrap().unwrap();
        assert_eq!(decoded.sequence, 10);
        assert!(decoder.next_record().is_none());

        decoder.extend(&stream[20..]);
        let decoded = decoder.next_record().unwrap().unwrap();
        assert_eq!(decoded, SignalRecord::new(11, 0.75, 1001));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_stays_aligned_after_malformed_record() {
        let mut decoder = RecordDecoder::new();
        decoder.extend(&SignalRecord::new(1, f32::INFINITY, 0).to_bytes());
        decoder.extend(&SignalRecord::new(2, 0.25, 0).to_bytes());

        assert!(decoder.next_record().unwrap().is_err());
        assert_eq!(decoder.next_record().unwrap().unwrap().sequence, 2);
    }

    #[test]
    fn test_is_newer_handles_wraparound() {
        assert!(is_newer(2, 1));
        assert!(!is_newer(1, 1));
        assert!(!is_newer(1, 2));
        assert!(is_newer(0, u32::MAX));
    }

    proptest::proptest! {
        #[test]
        fn test_decoder_handles_any_split(
            values in proptest::collection::vec(-1.0e6f32..1.0e6, 1..20),
            split in 1usize..RECORD_LEN * 3,
        ) {
            let mut wire = BytesMut::new();
            for (i, v) in values.iter().enumerate() {
                SignalRecord::new(i as u32, *v, 42).encode(&mut wire);
            }

            let mut decoder = RecordDecoder::new();
            let mut decoded = Vec::new();
            for chunk in wire.chunks(split) {
                decoder.extend(chunk);
                while let Some(record) = decoder.next_record() {
                    decoded.push(record.unwrap().value);
                }
            }
            proptest::prop_assert_eq!(decoded, values);
        }
    }
}
