//! vigil-protocol: the small slice of RESP that vigil speaks.
//!
//! The proxy itself never looks inside the traffic it relays. This crate
//! covers the two places where vigil does talk to the store ecosystem
//! directly: the witness discovery exchange and the companion health check.
//!
//! # quick start
//!
//! ```
//! use vigil_protocol::{parse_frame, reply, Frame};
//!
//! let raw = b"*2\r\n$8\r\n10.0.0.5\r\n$4\r\n6379\r\n";
//! let (frame, consumed) = parse_frame(raw).unwrap().unwrap();
//! assert_eq!(consumed, raw.len());
//! assert!(matches!(frame, Frame::Array(_)));
//!
//! let primary = reply::parse_primary_reply(raw).unwrap();
//! assert_eq!(primary.host, "10.0.0.5");
//! assert_eq!(primary.port, 6379);
//! ```

pub mod error;
pub mod parse;
pub mod reply;
mod serialize;
pub mod types;

pub use error::{ProtocolError, ReplyError};
pub use parse::parse_frame;
pub use reply::{inline_command, parse_primary_reply, PrimaryReply};
pub use types::Frame;
