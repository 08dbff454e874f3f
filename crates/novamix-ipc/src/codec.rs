//! Newline-delimited JSON framing.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};
use tracing::warn;

use crate::error::IpcError;

/// Longest accepted line, in bytes.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Decodes one `D` per line and encodes any `Serialize` value as one line.
///
/// Lines that are not valid JSON for `D` are logged and skipped so a single
/// bad message does not tear down the connection.
pub struct JsonLinesCodec<D> {
    lines: LinesCodec,
    _decoded: PhantomData<fn() -> D>,
}

impl<D> JsonLinesCodec<D> {
    #[must_use]
    pub fn new() -> Self {
        Self { lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH), _decoded: PhantomData }
    }
}

impl<D> Default for JsonLinesCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned> JsonLinesCodec<D> {
    fn parse(line: Option<String>) -> ParseOutcome<D> {
        let Some(line) = line else {
            return ParseOutcome::NeedMore;
        };
        if line.trim().is_empty() {
            return ParseOutcome::Skip;
        }
        match serde_json::from_str(&line) {
            Ok(item) => ParseOutcome::Item(item),
            Err(e) => {
                warn!(error = %e, "Skipping malformed IPC message");
                ParseOutcome::Skip
            }
        }
    }
}

enum ParseOutcome<D> {
    Item(D),
    Skip,
    NeedMore,
}

impl<D: DeserializeOwned> Decoder for JsonLinesCodec<D> {
    type Item = D;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>, IpcError> {
        loop {
            match Self::parse(self.lines.decode(src)?) {
                ParseOutcome::Item(item) => return Ok(Some(item)),
                ParseOutcome::Skip => {}
                ParseOutcome::NeedMore => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<D>, IpcError> {
        loop {
            match Self::parse(self.lines.decode_eof(src)?) {
                ParseOutcome::Item(item) => return Ok(Some(item)),
                ParseOutcome::Skip => {}
                ParseOutcome::NeedMore => return Ok(None),
            }
        }
    }
}

impl<D, T: Serialize> Encoder<T> for JsonLinesCodec<D> {
    type Error = IpcError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), IpcError> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_decodes_one_message_per_line() {
        let mut codec = JsonLinesCodec::<Ping>::new();
        let mut buf = BytesMut::from(&b"{\"seq\":1}\n{\"seq\":2}\n{\"seq\""[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Ping { seq: 1 }));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Ping { seq: 2 }));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b":3}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Ping { seq: 3 }));
    }

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let mut codec = JsonLinesCodec::<Ping>::new();
        let mut buf = BytesMut::from(&b"\nnot json\n{\"other\":true}\n{\"seq\":9}\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Ping { seq: 9 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_without_trailing_newline() {
        let mut codec = JsonLinesCodec::<Ping>::new();
        let mut buf = BytesMut::from(&b"{\"seq\":4}"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Ping { seq: 4 }));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = JsonLinesCodec::<Ping>::new();
        let mut buf = BytesMut::new();

        codec.encode(Ping { seq: 5 }, &mut buf).unwrap();
        assert_eq!(&buf[..], b"{\"seq\":5}\n");
    }

    #[test]
    fn test_oversized_line_is_an_error() {
        let mut codec = JsonLinesCodec::<Ping>::new();
        let mut buf = BytesMut::from(vec![b'x'; MAX_LINE_LENGTH + 1].as_slice());

        assert!(matches!(codec.decode(&mut buf), Err(IpcError::MessageTooLong(_))));
    }
}
