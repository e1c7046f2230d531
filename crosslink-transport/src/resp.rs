//! RESP wire format used to talk to the broker.
//!
//! Frames are prefixed by a type byte and terminated by `\r\n`:
//!
//! ```text
//! +OK\r\n                       simple string
//! -ERR unknown command\r\n      error
//! :3\r\n                        integer
//! $5\r\nhello\r\n               bulk string ($-1 is null)
//! *2\r\n$3\r\nfoo\r\n:1\r\n     array (*-1 is null)
//! >3\r\n...                     push (RESP3, decoded like an array)
//! ```
//!
//! Commands are always sent as arrays of bulk strings. Decoding is
//! incremental: [`decode`] returns `Ok(None)` until a whole frame is
//! buffered and only then consumes bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest bulk string accepted from the broker (mirrors the server's
/// default `proto-max-bulk-len`).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Largest array accepted from the broker.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Items reserved up front for an array; a header alone never allocates more.
const ARRAY_PREALLOC: usize = 64;

/// Decoding errors. Any of these leaves the connection unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RespError {
    /// Frame starts with a byte that is not a known type prefix.
    #[error("invalid frame prefix: {byte:#04x}")]
    InvalidPrefix {
        /// The offending byte.
        byte: u8,
    },

    /// A length or integer field did not parse.
    #[error("invalid integer in frame: {text:?}")]
    InvalidInteger {
        /// The raw field.
        text: String,
    },

    /// A simple string or error frame was not valid UTF-8.
    #[error("frame is not valid utf-8")]
    InvalidUtf8,

    /// Bulk string or array length exceeds the accepted maximum.
    #[error("frame too large: {size}")]
    TooLarge {
        /// Declared size.
        size: usize,
    },

    /// Bulk string payload was not followed by `\r\n`.
    #[error("missing frame terminator")]
    MissingTerminator,
}

/// One decoded RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+...`
    Simple(String),
    /// `-...`
    Error(String),
    /// `:...`
    Integer(i64),
    /// `$...`; `None` for the null bulk string.
    Bulk(Option<Bytes>),
    /// `*...` or `>...`; `None` for the null array.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Text view of simple and bulk strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::Simple(s) => Some(s),
            RespValue::Bulk(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Consume a bulk string into its bytes.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            RespValue::Bulk(Some(b)) => Some(b),
            RespValue::Simple(s) => Some(Bytes::from(s)),
            _ => None,
        }
    }
}

/// Append a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]], buf: &mut BytesMut) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Decode one value from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed; `buf` is untouched in
/// that case. On success the frame's bytes are consumed.
///
/// # Errors
///
/// Returns a [`RespError`] when the buffered bytes can never form a valid
/// frame.
pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
    match parse(buf, 0)? {
        Some((value, consumed)) => {
            buf.advance(consumed);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Parse a value starting at `pos`; returns the value and the position
/// after it.
fn parse(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(&prefix) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    match prefix {
        b'+' => Ok(Some((RespValue::Simple(utf8(line)?), next))),
        b'-' => Ok(Some((RespValue::Error(utf8(line)?), next))),
        b':' => Ok(Some((RespValue::Integer(integer(line)?), next))),
        b'$' => {
            let len = integer(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Bulk(None), next)));
            }
            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(RespError::TooLarge { size: len });
            }
            let end = next + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::MissingTerminator);
            }
            let data = Bytes::copy_from_slice(&buf[next..end]);
            Ok(Some((RespValue::Bulk(Some(data)), end + 2)))
        }
        b'*' | b'>' => {
            let len = integer(line)?;
            if len < 0 {
                return Ok(Some((RespValue::Array(None), next)));
            }
            let len = len as usize;
            if len > MAX_ARRAY_LEN {
                return Err(RespError::TooLarge { size: len });
            }
            let mut items = Vec::with_capacity(len.min(ARRAY_PREALLOC));
            let mut cursor = next;
            for _ in 0..len {
                match parse(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((RespValue::Array(Some(items)), cursor)))
        }
        other => Err(RespError::InvalidPrefix { byte: other }),
    }
}

/// Find the `\r\n`-terminated line starting at `start`.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], start + idx + 2))
}

fn utf8(line: &[u8]) -> Result<String, RespError> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| RespError::InvalidUtf8)
}

fn integer(line: &[u8]) -> Result<i64, RespError> {
    let text = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
    text.parse().map_err(|_| RespError::InvalidInteger {
        text: text.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<Option<RespValue>, RespError> {
        let mut buf = BytesMut::from(input);
        decode(&mut buf)
    }

    #[test]
    fn test_encode_publish_command() {
        let mut buf = BytesMut::new();
        encode_command(&[b"PUBLISH", b"chat", b"hi"], &mut buf);
        assert_eq!(
            &buf[..],
            b"*3\r\n$7\r\nPUBLISH\r\n$4\r\nchat\r\n$2\r\nhi\r\n"
        );
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            decode_all(b"+PONG\r\n"),
            Ok(Some(RespValue::Simple("PONG".into())))
        );
        assert_eq!(
            decode_all(b"-NOAUTH Authentication required.\r\n"),
            Ok(Some(RespValue::Error(
                "NOAUTH Authentication required.".into()
            )))
        );
        assert_eq!(decode_all(b":42\r\n"), Ok(Some(RespValue::Integer(42))));
        assert_eq!(decode_all(b"$-1\r\n"), Ok(Some(RespValue::Bulk(None))));
    }

    #[test]
    fn test_decode_pubsub_message() {
        let frame = b"*3\r\n$7\r\nmessage\r\n$4\r\nchat\r\n$5\r\nhello\r\n";
        let value = decode_all(frame).expect("valid").expect("complete");
        let RespValue::Array(Some(items)) = value else {
            panic!("expected array");
        };
        assert_eq!(items[0].as_str(), Some("message"));
        assert_eq!(items[1].as_str(), Some("chat"));
        assert_eq!(items[2].clone().into_bytes(), Some(Bytes::from("hello")));
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let frame = b"*3\r\n$7\r\nmessage\r\n$4\r\nchat\r\n$5\r\nhello\r\n";
        for cut in 0..frame.len() {
            let mut buf = BytesMut::from(&frame[..cut]);
            assert_eq!(decode(&mut buf), Ok(None), "cut at {}", cut);
            assert_eq!(buf.len(), cut, "partial input must not be consumed");
        }
    }

    #[test]
    fn test_decode_large_array_header() {
        let mut buf = BytesMut::from(format!("*{}\r\n:1\r\n", MAX_ARRAY_LEN).as_bytes());
        assert_eq!(decode(&mut buf), Ok(None));

        let mut frame = b"*1000\r\n".to_vec();
        for _ in 0..1000 {
            frame.extend_from_slice(b":7\r\n");
        }
        match decode_all(&frame) {
            Ok(Some(RespValue::Array(Some(items)))) => assert_eq!(items.len(), 1000),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_consumes_one_frame_at_a_time() {
        let mut buf = BytesMut::from(&b":1\r\n:2\r\n"[..]);
        assert_eq!(decode(&mut buf), Ok(Some(RespValue::Integer(1))));
        assert_eq!(decode(&mut buf), Ok(Some(RespValue::Integer(2))));
        assert_eq!(decode(&mut buf), Ok(None));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_binary_payload_with_crlf() {
        let value = decode_all(b"$4\r\na\r\nb\r\n")
            .expect("valid")
            .expect("complete");
        assert_eq!(value, RespValue::Bulk(Some(Bytes::from_static(b"a\r\nb"))));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(
            decode_all(b"?what\r\n"),
            Err(RespError::InvalidPrefix { byte: b'?' })
        );
        assert!(matches!(
            decode_all(b":abc\r\n"),
            Err(RespError::InvalidInteger { .. })
        ));
        assert_eq!(
            decode_all(b"$2\r\nabcd\r\n"),
            Err(RespError::MissingTerminator)
        );
    }

    #[test]
    fn test_decode_push_frame_as_array() {
        let value = decode_all(b">2\r\n+pong\r\n$0\r\n\r\n")
            .expect("valid")
            .expect("complete");
        assert_eq!(
            value,
            RespValue::Array(Some(vec![
                RespValue::Simple("pong".into()),
                RespValue::Bulk(Some(Bytes::new())),
            ]))
        );
    }
}
