// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, AppResult};

/// Byte sequence that terminates a line. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter(Bytes);

impl Delimiter {
    pub fn new(bytes: impl Into<Bytes>) -> AppResult<Delimiter> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AppError::InvalidValue(
                "line delimiter must not be empty".to_string(),
            ));
        }
        Ok(Delimiter(bytes))
    }

    pub fn newline() -> Delimiter {
        Delimiter(Bytes::from_static(b"\n"))
    }

    pub fn crlf() -> Delimiter {
        Delimiter(Bytes::from_static(b"\r\n"))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Delimiter::newline()
    }
}

/// One reassembled line with its delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineRecord(Bytes);

impl LineRecord {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for LineRecord {
    fn from(bytes: Bytes) -> Self {
        LineRecord(bytes)
    }
}

impl AsRef<[u8]> for LineRecord {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for LineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl PartialEq<[u8]> for LineRecord {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<str> for LineRecord {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for LineRecord {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

/// Reassembles delimiter-terminated lines out of arbitrarily split input.
///
/// The codec holds no bytes itself; the accumulator is the `BytesMut` handed
/// to [`Decoder::decode`]. It only remembers how far that buffer has already
/// been scanned, so each byte is inspected a bounded number of times no
/// matter how small the incoming chunks are.
#[derive(Debug, Clone)]
pub struct LineCodec {
    delimiter: Delimiter,
    max_length: Option<usize>,
    // earliest offset where the next delimiter may start
    next_index: usize,
}

impl LineCodec {
    pub fn new(delimiter: Delimiter) -> LineCodec {
        LineCodec {
            delimiter,
            max_length: None,
            next_index: 0,
        }
    }

    /// Lines longer than `max_length` bytes fail with [`AppError::LineTooLong`].
    pub fn with_max_length(delimiter: Delimiter, max_length: usize) -> LineCodec {
        LineCodec {
            max_length: Some(max_length),
            ..LineCodec::new(delimiter)
        }
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    fn check_length(&self, len: usize) -> AppResult<()> {
        match self.max_length {
            Some(max) if len > max => Err(AppError::LineTooLong(len, max)),
            _ => Ok(()),
        }
    }

    fn find_delimiter(&self, buf: &[u8]) -> Option<usize> {
        let delimiter = self.delimiter.as_bytes();
        if buf.len() < self.next_index + delimiter.len() {
            return None;
        }
        buf[self.next_index..]
            .windows(delimiter.len())
            .position(|window| window == delimiter)
            .map(|pos| self.next_index + pos)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        LineCodec::new(Delimiter::default())
    }
}

impl Decoder for LineCodec {
    type Item = LineRecord;
    type Error = AppError;

    fn decode(&mut self, buf: &mut BytesMut) -> AppResult<Option<LineRecord>> {
        match self.find_delimiter(buf) {
            Some(end) => {
                self.check_length(end)?;
                let line = buf.split_to(end).freeze();
                buf.advance(self.delimiter.len());
                self.next_index = 0;
                Ok(Some(LineRecord(line)))
            }
            None => {
                // keep the tail that may hold the first bytes of a split delimiter
                self.next_index = buf.len().saturating_sub(self.delimiter.len() - 1);
                self.check_length(self.next_index)?;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> AppResult<Option<LineRecord>> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.check_length(buf.len())?;
        let line = buf.split().freeze();
        self.next_index = 0;
        Ok(Some(LineRecord(line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, chunks: &[&[u8]]) -> AppResult<Vec<LineRecord>> {
        let mut buf = BytesMut::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            while let Some(line) = codec.decode(&mut buf)? {
                lines.push(line);
            }
        }
        while let Some(line) = codec.decode_eof(&mut buf)? {
            lines.push(line);
        }
        Ok(lines)
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        assert!(matches!(
            Delimiter::new(Bytes::new()),
            Err(AppError::InvalidValue(_))
        ));
        assert_eq!(Delimiter::default(), Delimiter::newline());
        assert_eq!(Delimiter::crlf().len(), 2);
    }

    #[test]
    fn test_example_scenario() {
        let mut codec = LineCodec::default();
        let lines = decode_all(&mut codec, &[b"first\nseco", b"nd\nthird"]).unwrap();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_several_lines_in_one_chunk() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"a\nbb\nccc\ndd"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "a");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "bb");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "ccc");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"dd");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut codec = LineCodec::new(Delimiter::crlf());
        let lines = decode_all(&mut codec, &[b"GET / HTTP/1.1\r", b"\nHost: x\r\n"]).unwrap();
        assert_eq!(lines, vec!["GET / HTTP/1.1", "Host: x"]);
    }

    #[test]
    fn test_lone_carriage_return_is_data() {
        let mut codec = LineCodec::new(Delimiter::crlf());
        let lines = decode_all(&mut codec, &[b"a\rb\r", b"c\r\n"]).unwrap();
        assert_eq!(lines, vec!["a\rb\rc"]);
    }

    #[test]
    fn test_long_delimiter_one_byte_at_a_time() {
        let mut codec = LineCodec::new(Delimiter::new(&b"<EOR>"[..]).unwrap());
        let input = b"one<EOR>two<EO<EOR>three";
        let chunks: Vec<&[u8]> = input.chunks(1).collect();
        let lines = decode_all(&mut codec, &chunks).unwrap();
        assert_eq!(lines, vec!["one", "two<EO", "three"]);
    }

    #[test]
    fn test_only_delimiter_yields_one_empty_line() {
        let mut codec = LineCodec::default();
        let lines = decode_all(&mut codec, &[b"\n"]).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_empty());
    }

    #[test]
    fn test_no_trailing_empty_record() {
        let mut codec = LineCodec::default();
        let lines = decode_all(&mut codec, &[b"a\nb\n"]).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_consecutive_delimiters_yield_empty_lines() {
        let mut codec = LineCodec::new(Delimiter::crlf());
        let lines = decode_all(&mut codec, &[b"a\r\n\r\nb"]).unwrap();
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let mut codec = LineCodec::default();
        assert!(decode_all(&mut codec, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_max_length_on_complete_line() {
        let mut codec = LineCodec::with_max_length(Delimiter::newline(), 4);
        let mut buf = BytesMut::from(&b"abcd\nabcde\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "abcd");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(AppError::LineTooLong(5, 4))
        ));
    }

    #[test]
    fn test_max_length_on_unterminated_data() {
        let mut codec = LineCodec::with_max_length(Delimiter::crlf(), 4);
        // a full-size line plus half a delimiter is still acceptable
        let mut buf = BytesMut::from(&b"abcd\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "abcd");

        buf.extend_from_slice(b"abcdef");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(AppError::LineTooLong(_, 4))
        ));
    }

    #[test]
    fn test_max_length_on_trailing_data() {
        let mut codec = LineCodec::with_max_length(Delimiter::crlf(), 3);
        let mut buf = BytesMut::from(&b"abcd"[..]);
        assert!(codec.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn test_line_record_views() {
        let line = LineRecord::from(Bytes::from_static(b"caf\xc3\xa9"));
        assert_eq!(line.to_string(), "café");
        assert_eq!(line.len(), 5);
        assert_eq!(&line, &b"caf\xc3\xa9"[..]);
    }
}
