//! Witness discovery exchange: inline command encoding and primary
//! address extraction.
//!
//! A witness answers "get primary address by group name" with a two
//! element array:
//!
//! ```text
//! *2\r\n$8\r\n10.0.0.5\r\n$4\r\n6379\r\n
//! ```
//!
//! Split on CRLF that reads `["*2", "$8", "10.0.0.5", "$4", "6379", ""]`,
//! so the host is field 2 and the port field 4. Anything shorter is
//! malformed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ReplyError;

/// Index of the host field in a CRLF-split primary address reply.
pub const HOST_FIELD: usize = 2;

/// Index of the port field in a CRLF-split primary address reply.
pub const PORT_FIELD: usize = 4;

/// Minimum number of CRLF-delimited fields in a usable reply.
pub const MIN_FIELDS: usize = PORT_FIELD + 1;

/// A primary address as reported by a witness, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryReply {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for PrimaryReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Encodes a newline-terminated inline command.
///
/// Arguments containing whitespace, quotes, or control bytes are wrapped
/// in double quotes with C-style escapes, which inline command parsing
/// on the witness side understands.
pub fn inline_command(args: &[&str]) -> Bytes {
    let mut out = BytesMut::with_capacity(args.iter().map(|a| a.len() + 1).sum::<usize>() + 1);
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.put_u8(b' ');
        }
        push_arg(&mut out, arg);
    }
    out.put_u8(b'\n');
    out.freeze()
}

fn push_arg(out: &mut BytesMut, arg: &str) {
    let needs_quotes = arg.is_empty()
        || arg
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b == b'"' || b == b'\'' || b.is_ascii_control());
    if !needs_quotes {
        out.put_slice(arg.as_bytes());
        return;
    }

    out.put_u8(b'"');
    for b in arg.bytes() {
        match b {
            b'"' => out.put_slice(b"\\\""),
            b'\\' => out.put_slice(b"\\\\"),
            b'\n' => out.put_slice(b"\\n"),
            b'\r' => out.put_slice(b"\\r"),
            b'\t' => out.put_slice(b"\\t"),
            b if b.is_ascii_control() => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                out.put_slice(b"\\x");
                out.put_u8(HEX[(b >> 4) as usize]);
                out.put_u8(HEX[(b & 0x0f) as usize]);
            }
            b => out.put_u8(b),
        }
    }
    out.put_u8(b'"');
}

/// Splits a raw reply into its CRLF-delimited fields.
pub fn split_fields(raw: &[u8]) -> Result<Vec<&str>, ReplyError> {
    let text = std::str::from_utf8(raw).map_err(|_| ReplyError::InvalidUtf8)?;
    Ok(text.split("\r\n").collect())
}

/// Extracts the host and port from a primary address reply.
pub fn parse_primary_reply(raw: &[u8]) -> Result<PrimaryReply, ReplyError> {
    let fields = split_fields(raw)?;

    if fields.len() < MIN_FIELDS {
        // short replies are malformed; name the common cases
        let first = fields.first().copied().unwrap_or_default();
        return Err(match first {
            "*-1" | "$-1" | "_" => ReplyError::UnknownGroup,
            f if f.starts_with('-') => ReplyError::Rejected(f[1..].to_string()),
            _ => ReplyError::TooFewFields {
                expected: MIN_FIELDS,
                got: fields.len(),
            },
        });
    }

    let host = fields[HOST_FIELD].trim();
    if host.is_empty() {
        return Err(ReplyError::EmptyHost);
    }
    let port_field = fields[PORT_FIELD].trim();
    let port = port_field
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ReplyError::InvalidPort(port_field.to_string()))?;

    Ok(PrimaryReply {
        host: host.to_string(),
        port,
    })
}
