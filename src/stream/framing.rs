//! Newline framing for NDJSON response bodies.
//!
//! Network chunks split records and multi-byte UTF-8 characters at
//! arbitrary points. `FramedRead` keeps the unterminated tail as raw
//! bytes and the codec only decodes complete lines. A `\n` byte never
//! occurs inside a multi-byte UTF-8 sequence, so splitting on it before
//! decoding cannot cut a character in half.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;

use crate::backend::ByteStream;
use crate::error::TurnError;

/// Complete lines of a response body, in arrival order.
pub type LineStream = FramedRead<StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>, NdjsonCodec>;

/// Frame a body into lines. Transport errors travel through the reader
/// as `io::Error`; `TurnError::from_body_error` recovers them.
pub fn frame_lines(body: ByteStream) -> LineStream {
    let body = body.map(|chunk| chunk.map_err(io::Error::other)).boxed();
    FramedRead::new(StreamReader::new(body), NdjsonCodec::new())
}

/// Like `LinesCodec`, but invalid UTF-8 is replaced instead of failing
/// the stream, blank lines are skipped and a trailing `\r` is removed.
/// At end of input the unterminated tail is the last line.
#[derive(Debug, Default)]
pub struct NdjsonCodec {
    // Bytes already searched for a terminator
    scanned: usize,
}

impl NdjsonCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(offset) = buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = buf.len();
                return Ok(None);
            };
            let raw = buf.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            if let Some(line) = decode_line(&raw[..raw.len() - 1]) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.scanned = 0;
        let rest = buf.split();
        Ok(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        return None;
    }
    Some(line.into_owned())
}
