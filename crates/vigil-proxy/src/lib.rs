//! vigil-proxy: a TCP proxy that always forwards to the current primary
//! of a witness-managed group.
//!
//! The [`watcher::Watcher`] polls witnesses through a [`locator::Locator`]
//! and publishes the primary into [`state::PrimaryState`]. The
//! [`relay::Relay`] accepts clients and pipes each one to the primary it
//! saw at accept time, closing it when that primary is replaced.

pub mod config;
pub mod error;
pub mod locator;
pub mod metrics;
pub mod relay;
pub mod state;
pub mod watcher;

pub use config::{ProxySettings, VigilConfig};
pub use error::{ConfigError, DiscoveryError, SessionError, WitnessError};
pub use locator::{Locate, Locator, WitnessEndpoint};
pub use relay::{Relay, SessionEnd};
pub use state::{DrainSignal, PrimaryState, PrimaryView, Snapshot, Transition};
pub use watcher::Watcher;
