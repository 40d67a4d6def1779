//! Async TCP connection to the proxy.
//!
//! Sends commands as RESP arrays of bulk strings and reads back parsed
//! frames.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vigil_protocol::{parse_frame, Frame, ProtocolError};

/// Errors that can occur during connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server disconnected")]
    Disconnected,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("server returned an error: {0}")]
    Server(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A TCP connection with read/write buffering.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    /// Connects to `addr` (`host:port`; hostnames are resolved).
    pub async fn connect(addr: &str) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(512),
            write_buf: BytesMut::with_capacity(512),
        })
    }

    /// Sends a command and reads the response.
    pub async fn send_command(&mut self, tokens: &[&str]) -> Result<Frame, ConnectionError> {
        self.write_buf.clear();
        Frame::command(tokens).serialize(&mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        self.read_response().await
    }

    /// Authenticates with the AUTH command.
    pub async fn authenticate(&mut self, password: &str) -> Result<(), ConnectionError> {
        match self.send_command(&["AUTH", password]).await? {
            Frame::Simple(s) if s == "OK" => Ok(()),
            Frame::Error(e) => Err(ConnectionError::AuthFailed(e)),
            _ => Err(ConnectionError::AuthFailed(
                "unexpected response to AUTH".into(),
            )),
        }
    }

    /// Reads one complete frame.
    async fn read_response(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            if !self.read_buf.is_empty() {
                if let Some((frame, consumed)) = parse_frame(&self.read_buf)? {
                    let _ = self.read_buf.split_to(consumed);
                    return Ok(frame);
                }
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(ConnectionError::Disconnected);
            }
        }
    }

    /// Closes the write side.
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
