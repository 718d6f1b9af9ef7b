//! RecordIO framing for the subscription event stream.
//!
//! Each record is `<decimal length>\n<length bytes>`. Chunk boundaries from
//! the HTTP body do not line up with records, so the decoder buffers until a
//! full record is available.

use bytes::{Buf, Bytes, BytesMut};
use prost::Message;

use crate::error::{ProtoError, ProtoResult};
use crate::scheduler::Event;

/// Longest accepted length header, in digits.
const MAX_HEADER_DIGITS: usize = 20;

/// Records larger than this are treated as a corrupt stream.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Incremental decoder for a RecordIO byte stream.
#[derive(Debug, Default)]
pub struct RecordIoDecoder {
    buf: BytesMut,
    pending_len: Option<usize>,
}

impl RecordIoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// True when no partial record is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.pending_len.is_none()
    }

    /// Pop the next complete record, if one is buffered.
    pub fn next_record(&mut self) -> ProtoResult<Option<Bytes>> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                let Some(newline) = self.buf.iter().position(|b| *b == b'\n') else {
                    if self.buf.len() > MAX_HEADER_DIGITS {
                        return Err(ProtoError::InvalidRecordLength(
                            String::from_utf8_lossy(&self.buf[..MAX_HEADER_DIGITS]).into_owned(),
                        ));
                    }
                    return Ok(None);
                };
                let header = self.buf.split_to(newline);
                self.buf.advance(1);
                let text = std::str::from_utf8(&header)
                    .map_err(|_| ProtoError::InvalidRecordLength(format!("{header:?}")))?;
                let len: usize = text
                    .trim()
                    .parse()
                    .map_err(|_| ProtoError::InvalidRecordLength(text.to_string()))?;
                if len > MAX_RECORD_BYTES {
                    return Err(ProtoError::RecordTooLarge(len));
                }
                self.pending_len = Some(len);
                len
            }
        };

        if self.buf.len() < len {
            return Ok(None);
        }
        self.pending_len = None;
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Pop and decode the next complete event, if one is buffered.
    pub fn next_event(&mut self) -> ProtoResult<Option<Event>> {
        match self.next_record()? {
            Some(record) => Ok(Some(Event::decode(record)?)),
            None => Ok(None),
        }
    }
}

/// Frame a single record.
pub fn encode_record(record: &[u8]) -> Vec<u8> {
    let mut out = format!("{}\n", record.len()).into_bytes();
    out.extend_from_slice(record);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::event;

    #[test]
    fn decodes_records_split_across_chunks() {
        let mut stream = encode_record(b"hello");
        stream.extend(encode_record(b"world!"));

        let mut decoder = RecordIoDecoder::new();
        let mut records = Vec::new();
        for chunk in stream.chunks(3) {
            decoder.push(chunk);
            while let Some(rec) = decoder.next_record().unwrap() {
                records.push(rec);
            }
        }

        assert_eq!(records, vec![Bytes::from("hello"), Bytes::from("world!")]);
    }

    #[test]
    fn incomplete_record_waits_for_more_input() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"10\nabc");
        assert!(decoder.next_record().unwrap().is_none());
        decoder.push(b"defghij");
        assert_eq!(decoder.next_record().unwrap().unwrap(), Bytes::from("abcdefghij"));
    }

    #[test]
    fn zero_length_record() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"0\n");
        assert_eq!(decoder.next_record().unwrap().unwrap().len(), 0);
    }

    #[test]
    fn rejects_non_numeric_header() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(b"abc\nxyz");
        assert!(matches!(
            decoder.next_record(),
            Err(ProtoError::InvalidRecordLength(_))
        ));
    }

    #[test]
    fn rejects_runaway_header() {
        let mut decoder = RecordIoDecoder::new();
        decoder.push(&[b'9'; 32]);
        assert!(decoder.next_record().is_err());
    }

    #[test]
    fn decodes_heartbeat_event() {
        let heartbeat = Event {
            r#type: Some(event::Type::Heartbeat as i32),
            ..Default::default()
        };
        let mut decoder = RecordIoDecoder::new();
        decoder.push(&encode_record(&heartbeat.encode_to_vec()));

        let decoded = decoder.next_event().unwrap().unwrap();
        assert_eq!(decoded.r#type(), event::Type::Heartbeat);
    }
}
