//! Error types for RESP parsing and witness reply extraction.

use thiserror::Error;

/// Errors that can occur when parsing the RESP wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first byte of a frame didn't match any known type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Failed to parse an integer value from the frame content.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or aggregate declared a length we can't accept.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A simple string or error line was not valid utf-8.
    #[error("invalid utf-8 in {0} line")]
    InvalidUtf8(&'static str),

    /// Bulk string larger than the parser is willing to buffer.
    #[error("bulk string too large: {0} bytes")]
    BulkStringTooLarge(usize),

    /// Aggregate declared more elements than allowed.
    #[error("too many elements: {0}")]
    TooManyElements(usize),

    /// Aggregates nested deeper than allowed.
    #[error("nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// Errors produced while extracting a primary address from a witness reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// Fewer CRLF-delimited fields than a primary address reply carries.
    #[error("malformed witness reply: expected at least {expected} fields, got {got}")]
    TooFewFields { expected: usize, got: usize },

    /// The witness answered with an error line.
    #[error("witness rejected query: {0}")]
    Rejected(String),

    /// The witness answered with a null reply: it doesn't know the group.
    #[error("witness does not know the requested group")]
    UnknownGroup,

    /// The host field was empty.
    #[error("malformed witness reply: empty host field")]
    EmptyHost,

    /// The port field wasn't a valid TCP port.
    #[error("malformed witness reply: invalid port {0:?}")]
    InvalidPort(String),

    /// The reply wasn't valid utf-8.
    #[error("malformed witness reply: not valid utf-8")]
    InvalidUtf8,
}
