//! RESP frame types.
//!
//! Blob strings use `Bytes` so replies can be sliced and passed around
//! without copying.

use bytes::Bytes;

/// A single RESP protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string, e.g. `+OK\r\n`.
    Simple(String),

    /// Error line, e.g. `-ERR unknown command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// Ordered array of frames, e.g. `*2\r\n+hello\r\n+world\r\n`.
    Array(Vec<Frame>),

    /// Null value. Parsed from RESP3 `_\r\n` as well as the RESP2 forms
    /// `$-1\r\n` and `*-1\r\n`. Always serialized as `_\r\n`.
    Null,

    /// Ordered map of key-value frame pairs, e.g. `%1\r\n+key\r\n+val\r\n`.
    Map(Vec<(Frame, Frame)>),
}

impl Frame {
    /// Returns `true` if this frame is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns the frame's payload as text when it is a simple or bulk
    /// string. Bulk strings that aren't utf-8 yield `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Builds a command frame: an array of bulk strings.
    pub fn command(args: &[&str]) -> Frame {
        Frame::Array(
            args.iter()
                .map(|a| Frame::Bulk(Bytes::copy_from_slice(a.as_bytes())))
                .collect(),
        )
    }
}
