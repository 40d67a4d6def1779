//! Primary watcher: polls the locator forever and publishes changes.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::locator::Locate;
use crate::metrics;
use crate::state::{PrimaryState, PrimaryView, Transition};

/// Owns the [`PrimaryState`] and is the only thing that writes to it.
pub struct Watcher<L> {
    locator: L,
    state: PrimaryState,
    poll_interval: Duration,
    cold_start_backoff: Duration,
}

impl<L: Locate> Watcher<L> {
    /// Creates a watcher with no known primary.
    ///
    /// `cold_start_backoff` is used between polls until the first primary
    /// is found, `poll_interval` from then on.
    pub fn new(
        locator: L,
        poll_interval: Duration,
        cold_start_backoff: Duration,
    ) -> (Self, PrimaryView) {
        let (state, view) = PrimaryState::new();
        let watcher = Self {
            locator,
            state,
            poll_interval,
            cold_start_backoff,
        };
        (watcher, view)
    }

    /// Another read-only view onto the published primary.
    pub fn view(&self) -> PrimaryView {
        self.state.view()
    }

    /// Runs one discovery and applies the result.
    ///
    /// Errors leave the current primary and generation untouched.
    pub async fn poll_once(&mut self) -> Option<Transition> {
        let primary = match self.locator.locate().await {
            Ok(primary) => primary,
            Err(e) => {
                metrics::record_discovery_failure();
                match self.state.current() {
                    Some(current) => warn!(%current, "primary discovery failed, keeping current: {e}"),
                    None => warn!("primary discovery failed, no primary known yet: {e}"),
                }
                return None;
            }
        };

        let transition = self.state.publish(primary);
        match transition {
            Some(t) => {
                info!(
                    old = ?t.from,
                    new = %t.to,
                    generation = t.generation,
                    "primary changed, draining previous generation"
                );
                metrics::record_primary_change(t.generation);
            }
            None => debug!(%primary, "primary unchanged"),
        }
        transition
    }

    /// How long to sleep before the next poll.
    pub fn next_delay(&self) -> Duration {
        if self.state.current().is_some() {
            self.poll_interval
        } else {
            self.cold_start_backoff
        }
    }

    /// Polls forever. Never returns on its own.
    pub async fn run(mut self) {
        info!(
            poll_interval = ?self.poll_interval,
            cold_start_backoff = ?self.cold_start_backoff,
            "primary watcher started"
        );
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.next_delay()).await;
        }
    }
}
