//! ROLE-based health classification.

use std::process::ExitCode;
use std::time::Duration;

use vigil_protocol::Frame;

use crate::connection::{Connection, ConnectionError};

/// Exit status for a reachable node that is not a usable primary or
/// connected replica.
pub const EXIT_UNHEALTHY: u8 = 127;

/// What the node behind the proxy says it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleStatus {
    Master,
    /// A replica whose link to its primary is up.
    ReplicaConnected,
    /// Anything else: a replica that is syncing or disconnected, a
    /// sentinel, or a reply we don't recognize.
    Unhealthy(String),
}

impl RoleStatus {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, RoleStatus::Unhealthy(_))
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_UNHEALTHY)
        }
    }
}

/// Classifies a ROLE reply.
///
/// Healthy replies are `["master", ...]` and `["slave", host, port,
/// "connected", ...]`.
pub fn classify(reply: &Frame) -> RoleStatus {
    let Frame::Array(items) = reply else {
        return RoleStatus::Unhealthy("ROLE reply is not an array".into());
    };

    match items.first().and_then(Frame::as_str) {
        Some("master") => RoleStatus::Master,
        Some("slave") => match items.get(3).and_then(Frame::as_str) {
            Some("connected") => RoleStatus::ReplicaConnected,
            Some(state) => RoleStatus::Unhealthy(format!("replica link is {state}")),
            None => RoleStatus::Unhealthy("replica reply has no link state".into()),
        },
        Some(role) => RoleStatus::Unhealthy(format!("role is {role}")),
        None => RoleStatus::Unhealthy("ROLE reply has no role".into()),
    }
}

/// Connects to `addr`, optionally authenticates, and asks for ROLE.
///
/// The whole exchange is bounded by `timeout`.
pub async fn check(
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Result<RoleStatus, ConnectionError> {
    let exchange = async {
        let mut conn = Connection::connect(addr).await?;
        if let Some(pw) = password {
            conn.authenticate(pw).await?;
        }
        let reply = conn.send_command(&["ROLE"]).await;
        conn.shutdown().await;

        match reply? {
            Frame::Error(e) => Err(ConnectionError::Server(e)),
            frame => Ok(classify(&frame)),
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
}
