//! Client-facing accept loop and per-connection relay.
//!
//! Each accepted connection takes one snapshot of the primary view and
//! keeps it for life: it dials that primary and listens on that
//! generation's drain signal, never a later one. The accept loop itself
//! never waits on the watcher.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::metrics;
use crate::state::{PrimaryView, Snapshot};

/// Pause after a failed `accept` (e.g. fd exhaustion) before retrying.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client→primary direction finished (EOF or error on the client).
    ClientClosed,
    /// The primary→client direction finished (EOF or error on the primary).
    UpstreamClosed,
    /// The session's generation was superseded by a new primary.
    Drained,
}

impl SessionEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEnd::ClientClosed => "client_closed",
            SessionEnd::UpstreamClosed => "upstream_closed",
            SessionEnd::Drained => "drained",
        }
    }
}

/// Accepts clients and relays each one to the primary current at accept
/// time.
pub struct Relay {
    listener: TcpListener,
    view: PrimaryView,
    dial_timeout: Duration,
}

impl Relay {
    /// Binds the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        view: PrimaryView,
        dial_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, view, dial_timeout))
    }

    pub fn from_listener(listener: TcpListener, view: PrimaryView, dial_timeout: Duration) -> Self {
        Self {
            listener,
            view,
            dial_timeout,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever. Accept errors are logged and retried.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("accepting clients on {addr}");
        }

        loop {
            match self.listener.accept().await {
                Ok((client, peer)) => {
                    let snapshot = self.view.snapshot();
                    let dial_timeout = self.dial_timeout;
                    tokio::spawn(serve(client, peer, snapshot, dial_timeout));
                }
                Err(e) => {
                    warn!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

/// Runs one session and records its outcome.
async fn serve(client: TcpStream, peer: SocketAddr, snapshot: Snapshot, dial_timeout: Duration) {
    let generation = snapshot.generation;
    let primary = snapshot.primary;
    metrics::record_session_opened();

    match proxy_session(client, snapshot, dial_timeout).await {
        Ok(end) => {
            debug!(%peer, ?primary, generation, end = end.as_str(), "session closed");
            metrics::record_session_closed(end);
        }
        Err(e) => {
            warn!(%peer, generation, "dropping client connection: {e}");
            metrics::record_session_dial_failure();
        }
    }
}

/// Relays bytes between `client` and the snapshot's primary until either
/// direction finishes or the snapshot's generation is drained.
///
/// Both sockets are closed on every return path: on error the client is
/// dropped before any upstream exists, otherwise all four stream halves
/// are dropped together once the race is decided.
pub async fn proxy_session(
    client: TcpStream,
    snapshot: Snapshot,
    dial_timeout: Duration,
) -> Result<SessionEnd, SessionError> {
    let Snapshot {
        generation,
        primary,
        mut drain,
    } = snapshot;
    let primary = primary.ok_or(SessionError::NoPrimary)?;

    let upstream = match timeout(dial_timeout, TcpStream::connect(primary)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SessionError::Dial { primary, source }),
        Err(_) => {
            return Err(SessionError::DialTimeout {
                primary,
                timeout: dial_timeout,
            })
        }
    };
    let _ = client.set_nodelay(true);
    let _ = upstream.set_nodelay(true);

    let (mut client_rd, mut client_wr) = client.into_split();
    let (mut upstream_rd, mut upstream_wr) = upstream.into_split();

    let end = tokio::select! {
        biased;

        _ = drain.drained() => SessionEnd::Drained,
        copied = pipe(&mut client_rd, &mut upstream_wr) => {
            debug!(%primary, generation, "client->primary finished: {}", describe(&copied));
            SessionEnd::ClientClosed
        }
        copied = pipe(&mut upstream_rd, &mut client_wr) => {
            debug!(%primary, generation, "primary->client finished: {}", describe(&copied));
            SessionEnd::UpstreamClosed
        }
    };

    drop((client_rd, client_wr, upstream_rd, upstream_wr));
    Ok(end)
}

/// Copies `src` into `dst` until EOF or error, then shuts down `dst`'s
/// write side.
async fn pipe<R, W>(src: &mut R, dst: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(src, dst).await;
    let _ = dst.shutdown().await;
    copied
}

fn describe(copied: &io::Result<u64>) -> String {
    match copied {
        Ok(n) => format!("{n} bytes"),
        Err(e) => format!("error: {e}"),
    }
}
