//! Proxy configuration.
//!
//! `VigilConfig` is the flat, string-friendly form read from TOML and
//! overridden by CLI flags and env vars. [`VigilConfig::resolve`] checks
//! it and produces the typed [`ProxySettings`] the runtime uses.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::locator::WitnessEndpoint;

/// Cold-start backoff is this many poll intervals.
pub const UNKNOWN_PRIMARY_BACKOFF_FACTOR: u32 = 5;

/// Raw configuration, as found in a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VigilConfig {
    /// Address clients connect to. An empty host binds all interfaces.
    pub listen: String,
    /// Comma-separated witness `host:port` list, tried in order.
    pub sentinel: String,
    /// Group name passed to the discovery query.
    pub master: String,
    /// Witness credential. Empty disables the AUTH step.
    pub password: String,
    /// Dial and read timeout for witnesses, probes, and primary dials.
    pub timeout_ms: u64,
    /// Steady-state polling interval.
    pub poll_interval_ms: u64,
    /// Log raw bytes exchanged with witnesses.
    pub debug: bool,
    /// Port for the metrics/health endpoint. 0 disables it.
    pub metrics_port: u16,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            listen: ":9999".into(),
            sentinel: ":26379".into(),
            master: String::new(),
            password: String::new(),
            timeout_ms: 1000,
            poll_interval_ms: 1000,
            debug: false,
            metrics_port: 0,
        }
    }
}

/// Validated settings for a running proxy.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub listen: SocketAddr,
    pub witnesses: Vec<WitnessEndpoint>,
    pub group: String,
    pub credential: Option<String>,
    pub dial_timeout: Duration,
    pub poll_interval: Duration,
    pub debug: bool,
    pub metrics: Option<SocketAddr>,
}

impl ProxySettings {
    /// Sleep between polls while no primary has ever been found.
    pub fn cold_start_backoff(&self) -> Duration {
        self.poll_interval * UNKNOWN_PRIMARY_BACKOFF_FACTOR
    }
}

impl VigilConfig {
    /// Loads a config from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Renders this config as TOML (used by `--config-template`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates every field and resolves addresses.
    pub fn resolve(&self) -> Result<ProxySettings, ConfigError> {
        let listen = parse_listen_addr(&self.listen)?;
        let witnesses = parse_witness_list(&self.sentinel)?;

        let group = self.master.trim();
        if group.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "master",
                reason: "a group name is required".into(),
            });
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout-ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll-interval-ms",
                reason: "must be greater than zero".into(),
            });
        }

        let metrics = match self.metrics_port {
            0 => None,
            port => Some(SocketAddr::new(listen.ip(), port)),
        };

        Ok(ProxySettings {
            listen,
            witnesses,
            group: group.to_string(),
            credential: (!self.password.is_empty()).then(|| self.password.clone()),
            dial_timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            debug: self.debug,
            metrics,
        })
    }
}

/// Parses the listen address. `:port` binds every interface and
/// hostnames are resolved once, here.
pub fn parse_listen_addr(input: &str) -> Result<SocketAddr, ConfigError> {
    let input = input.trim();
    let invalid = |reason: String| ConfigError::InvalidAddress {
        label: "listen",
        value: input.to_string(),
        reason,
    };

    let normalized = match input.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => input.to_string(),
    };
    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    normalized
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("resolved to no addresses".into()))
}

/// Parses a comma-separated witness list, keeping its order.
pub fn parse_witness_list(input: &str) -> Result<Vec<WitnessEndpoint>, ConfigError> {
    let witnesses = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<WitnessEndpoint>, _>>()?;

    if witnesses.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "sentinel",
            reason: "at least one witness address is required".into(),
        });
    }
    Ok(witnesses)
}
