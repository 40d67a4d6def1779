//! Primary discovery against the witness quorum.
//!
//! Witness hosts are tried in configured order and each host is resolved
//! on every attempt, so a single name can fan out to the whole quorum.
//! Every failure along the way is logged and skipped; only exhausting all
//! candidates is reported to the caller.
//!
//! A reported primary is only returned once a probe connection to it
//! succeeds; a witness may still be reporting a node that just went down.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};
use vigil_protocol::{inline_command, parse_frame, parse_primary_reply, Frame, PrimaryReply};

use crate::error::{ConfigError, DiscoveryError, WitnessError};

/// Upper bound on a single witness reply.
pub const MAX_REPLY_LEN: usize = 512;

/// A configured witness `host:port`. The host may be a name that resolves
/// to several witnesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessEndpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for WitnessEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            label: "witness",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        let host = match host {
            "" => "127.0.0.1",
            h if h.starts_with('[') => h
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .ok_or_else(|| invalid("unbalanced brackets"))?,
            h if h.contains(':') => return Err(invalid("IPv6 addresses must be bracketed")),
            h => h,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for WitnessEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Something that can find the current primary.
///
/// The watcher only depends on this, which lets tests script discovery
/// results without running witnesses.
pub trait Locate: Send + Sync + 'static {
    fn locate(&self) -> impl Future<Output = Result<SocketAddr, DiscoveryError>> + Send;
}

/// Queries witnesses for the primary of one group.
#[derive(Clone)]
pub struct Locator {
    witnesses: Vec<WitnessEndpoint>,
    group: String,
    credential: Option<String>,
    dial_timeout: Duration,
    debug: bool,
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("witnesses", &self.witnesses)
            .field("group", &self.group)
            .field("credential", &self.credential.as_ref().map(|_| "[redacted]"))
            .field("dial_timeout", &self.dial_timeout)
            .finish()
    }
}

impl Locator {
    pub fn new(
        witnesses: Vec<WitnessEndpoint>,
        group: impl Into<String>,
        credential: Option<String>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            witnesses,
            group: group.into(),
            credential,
            dial_timeout,
            debug: false,
        }
    }

    /// Logs raw witness traffic at debug level when enabled.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Runs one discovery pass and returns the first reachable primary.
    ///
    /// Touches no shared state; the only side effects are network I/O and
    /// logging.
    pub async fn locate_primary(&self) -> Result<SocketAddr, DiscoveryError> {
        let mut attempted = 0;

        for witness in &self.witnesses {
            let addrs = match timeout(
                self.dial_timeout,
                tokio::net::lookup_host((witness.host.as_str(), witness.port)),
            )
            .await
            {
                Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
                Ok(Err(e)) => {
                    warn!(%witness, "could not resolve witness: {e}");
                    continue;
                }
                Err(_) => {
                    warn!(%witness, timeout = ?self.dial_timeout, "timed out resolving witness");
                    continue;
                }
            };

            for addr in addrs {
                attempted += 1;
                match self.query_witness(addr).await {
                    Ok(primary) => {
                        debug!(witness = %addr, %primary, "witness reported reachable primary");
                        return Ok(primary);
                    }
                    Err(e) => warn!(%witness, witness_addr = %addr, "discovery attempt failed: {e}"),
                }
            }
        }

        Err(DiscoveryError::Exhausted { attempted })
    }

    /// Asks one witness address for the primary and probes the answer.
    async fn query_witness(&self, addr: SocketAddr) -> Result<SocketAddr, WitnessError> {
        let mut stream = match timeout(self.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(WitnessError::Connect(e)),
            Err(_) => return Err(self.timed_out("connect")),
        };

        if let Some(credential) = &self.credential {
            let request = inline_command(&["AUTH", credential]);
            if self.debug {
                debug!(witness = %addr, "sent: AUTH [redacted]");
            }
            self.send(&mut stream, &request, "auth").await?;
            let raw = self.read_reply(&mut stream, addr, "auth").await?;
            // not validated further: a wrong credential surfaces on the query
            if let Ok(Some((Frame::Error(msg), _))) = parse_frame(&raw) {
                warn!(witness = %addr, "witness refused AUTH: {msg}");
            }
        }

        let query = inline_command(&["SENTINEL", "get-master-addr-by-name", &self.group]);
        if self.debug {
            debug!(witness = %addr, "sent: {}", query.escape_ascii());
        }
        self.send(&mut stream, &query, "query").await?;
        let raw = self.read_reply(&mut stream, addr, "query").await?;
        drop(stream);

        let reported = parse_primary_reply(&raw)?;
        self.probe(&reported).await
    }

    async fn send(
        &self,
        stream: &mut TcpStream,
        bytes: &[u8],
        stage: &'static str,
    ) -> Result<(), WitnessError> {
        match timeout(self.dial_timeout, stream.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(WitnessError::Io { stage, source }),
            Err(_) => Err(self.timed_out(stage)),
        }
    }

    /// Reads until the buffer holds a complete reply, the witness closes
    /// the connection, or [`MAX_REPLY_LEN`] is reached.
    async fn read_reply(
        &self,
        stream: &mut TcpStream,
        addr: SocketAddr,
        stage: &'static str,
    ) -> Result<Vec<u8>, WitnessError> {
        let mut buf = [0u8; MAX_REPLY_LEN];
        let mut filled = 0;

        loop {
            let n = match timeout(self.dial_timeout, stream.read(&mut buf[filled..])).await {
                Ok(Ok(n)) => n,
                Ok(Err(source)) => return Err(WitnessError::Io { stage, source }),
                Err(_) => return Err(self.timed_out(stage)),
            };
            if n == 0 && filled == 0 {
                return Err(WitnessError::Closed(stage));
            }
            filled += n;

            // a parse error means no amount of extra bytes will help;
            // hand what we have to the field splitter
            let complete = n == 0 || !matches!(parse_frame(&buf[..filled]), Ok(None));
            if complete {
                break;
            }
            if filled == MAX_REPLY_LEN {
                return Err(WitnessError::ReplyTooLong {
                    stage,
                    limit: MAX_REPLY_LEN,
                });
            }
        }

        if self.debug {
            debug!(witness = %addr, "received: {}", buf[..filled].escape_ascii());
        }
        Ok(buf[..filled].to_vec())
    }

    /// Confirms the reported primary accepts connections. Returns the first
    /// resolved address that does.
    async fn probe(&self, reported: &PrimaryReply) -> Result<SocketAddr, WitnessError> {
        let lookup = tokio::net::lookup_host((reported.host.as_str(), reported.port));
        let candidates: Vec<SocketAddr> = match timeout(self.dial_timeout, lookup).await {
            Ok(Ok(addrs)) => addrs.collect(),
            Ok(Err(e)) => {
                return Err(WitnessError::CandidateResolve {
                    candidate: reported.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(WitnessError::CandidateResolve {
                    candidate: reported.to_string(),
                    reason: format!("timed out after {:?}", self.dial_timeout),
                })
            }
        };

        let mut reason = String::from("resolved to no addresses");
        for candidate in candidates {
            match timeout(self.dial_timeout, TcpStream::connect(candidate)).await {
                Ok(Ok(_probe)) => return Ok(candidate),
                Ok(Err(e)) => reason = format!("{candidate}: {e}"),
                Err(_) => reason = format!("{candidate}: timed out after {:?}", self.dial_timeout),
            }
        }

        Err(WitnessError::CandidateUnreachable {
            candidate: reported.to_string(),
            reason,
        })
    }

    fn timed_out(&self, stage: &'static str) -> WitnessError {
        WitnessError::Timeout {
            stage,
            timeout: self.dial_timeout,
        }
    }
}

impl Locate for Locator {
    fn locate(&self) -> impl Future<Output = Result<SocketAddr, DiscoveryError>> + Send {
        self.locate_primary()
    }
}
