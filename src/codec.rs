//! Line framer
//!
//! Turns a connection's byte stream into trimmed text lines. Lines end in
//! `\n` or `\r\n`; a partial line is kept in the read buffer until the rest
//! of it arrives. Outgoing messages are already rendered wire text, so the
//! encoder writes them through untouched.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A tokio codec that frames chat lines on `\n` boundaries.
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    /// Bytes before this index are known to contain no `\n`.
    next_index: usize,
    max_length: Option<usize>,
}

impl LineCodec {
    /// Create a codec with no line length limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that rejects lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: Some(max_length),
        }
    }

    /// Check the content of `raw` (a trailing `\r` does not count) against the limit.
    fn check_length(&self, raw: &[u8]) -> Result<(), CodecError> {
        let len = match raw.last() {
            Some(b'\r') => raw.len() - 1,
            _ => raw.len(),
        };
        match self.max_length {
            Some(max) if len > max => Err(CodecError::LineTooLong(max)),
            _ => Ok(()),
        }
    }
}

/// Decode a raw line and strip surrounding whitespace and control characters.
fn clean_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c.is_whitespace() || c.is_control())
        .to_string()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                self.check_length(&src[..end])?;

                let line = src.split_to(end + 1);
                Ok(Some(clean_line(&line[..end])))
            }
            None => {
                self.check_length(src)?;
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Peer closed mid-line: hand over whatever text it left behind.
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let tail = src.split();
        let line = clean_line(&tail);
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
