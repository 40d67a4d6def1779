//! Error types for the proxy.
//!
//! None of the runtime errors here are fatal. Witness and discovery
//! errors are logged and the next candidate (or the next poll) is tried;
//! session errors end one client connection. Only [`ConfigError`] stops
//! the process, and only at startup.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use vigil_protocol::ReplyError;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to render config as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid {label} address '{value}': {reason}")]
    InvalidAddress {
        label: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid {key} value: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Why a single witness address failed to yield a usable primary.
#[derive(Debug, Error)]
pub enum WitnessError {
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("timed out after {timeout:?} during {stage}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("i/o error during {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("witness closed the connection during {0}")]
    Closed(&'static str),

    #[error("reply to {stage} exceeded {limit} bytes")]
    ReplyTooLong { stage: &'static str, limit: usize },

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error("could not resolve reported primary {candidate}: {reason}")]
    CandidateResolve { candidate: String, reason: String },

    #[error("reported primary {candidate} is not accepting connections: {reason}")]
    CandidateUnreachable { candidate: String, reason: String },
}

/// Discovery failed against every configured witness.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no witness returned a usable primary ({attempted} witness addresses tried)")]
    Exhausted { attempted: usize },
}

/// Why a client session could not reach the primary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no primary has been discovered yet")]
    NoPrimary,

    #[error("dial to primary {primary} timed out after {timeout:?}")]
    DialTimeout {
        primary: SocketAddr,
        timeout: Duration,
    },

    #[error("dial to primary {primary} failed: {source}")]
    Dial {
        primary: SocketAddr,
        #[source]
        source: io::Error,
    },
}
