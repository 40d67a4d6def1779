//! The current primary and its generation.
//!
//! [`PrimaryState`] is the only writer. Everything else holds a
//! [`PrimaryView`] and takes a [`Snapshot`] when it needs one. A snapshot
//! carries the primary address together with the drain signal of the
//! generation it belongs to, published as a single value, so a reader can
//! never pair a new address with an old signal.
//!
//! Each generation owns a gate: a `watch` sender that never sends. Dropping
//! it closes the channel, which wakes every receiver at once and stays
//! closed forever after. Sessions keep a receiver clone; once the last of
//! them exits the old generation's channel is freed.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::watch;

/// Broadcast, fire-once termination signal for one generation.
#[derive(Debug, Clone)]
pub struct DrainSignal {
    rx: watch::Receiver<()>,
}

impl DrainSignal {
    /// Resolves once the generation has been superseded. Returns
    /// immediately if it already was.
    pub async fn drained(&mut self) {
        // the gate never sends, so `changed` only returns on close
        while self.rx.changed().await.is_ok() {}
    }

    /// Returns `true` if the generation has been superseded.
    pub fn is_drained(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

/// A consistent view of the primary at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Monotonic generation number. 0 until the first primary is found.
    pub generation: u64,
    /// Current primary, if one has ever been discovered.
    pub primary: Option<SocketAddr>,
    /// Fires when this generation is replaced.
    pub drain: DrainSignal,
}

/// A primary change, as reported by [`PrimaryState::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<SocketAddr>,
    pub to: SocketAddr,
    pub generation: u64,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "{from} -> {} (generation {})", self.to, self.generation),
            None => write!(f, "unknown -> {} (generation {})", self.to, self.generation),
        }
    }
}

/// Single-writer owner of the current primary and generation gate.
#[derive(Debug)]
pub struct PrimaryState {
    published: watch::Sender<Snapshot>,
    gate: watch::Sender<()>,
    generation: u64,
    primary: Option<SocketAddr>,
}

impl PrimaryState {
    /// Creates the state in the unknown-primary generation and returns a
    /// read-only view of it.
    pub fn new() -> (Self, PrimaryView) {
        let (gate, gate_rx) = watch::channel(());
        let (published, rx) = watch::channel(Snapshot {
            generation: 0,
            primary: None,
            drain: DrainSignal { rx: gate_rx },
        });
        let state = Self {
            published,
            gate,
            generation: 0,
            primary: None,
        };
        (state, PrimaryView { rx })
    }

    /// The primary currently in effect.
    pub fn current(&self) -> Option<SocketAddr> {
        self.primary
    }

    /// The current generation number.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Another read-only view onto this state.
    pub fn view(&self) -> PrimaryView {
        PrimaryView {
            rx: self.published.subscribe(),
        }
    }

    /// Records a discovery result.
    ///
    /// An address equal to the current one is a no-op. Anything else
    /// opens a new generation, publishes it, and then fires the previous
    /// generation's drain signal.
    pub fn publish(&mut self, primary: SocketAddr) -> Option<Transition> {
        if self.primary == Some(primary) {
            return None;
        }

        let (gate, gate_rx) = watch::channel(());
        let from = self.primary.replace(primary);
        self.generation += 1;
        self.published.send_replace(Snapshot {
            generation: self.generation,
            primary: Some(primary),
            drain: DrainSignal { rx: gate_rx },
        });

        // dropping the old sender closes its channel for every session
        drop(std::mem::replace(&mut self.gate, gate));

        Some(Transition {
            from,
            to: primary,
            generation: self.generation,
        })
    }
}

/// Read-only handle onto the published primary.
#[derive(Debug, Clone)]
pub struct PrimaryView {
    rx: watch::Receiver<Snapshot>,
}

impl PrimaryView {
    /// Takes a snapshot of the current primary and its drain signal.
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// The current primary, if any.
    pub fn primary(&self) -> Option<SocketAddr> {
        self.rx.borrow().primary
    }

    /// Waits until a snapshot satisfying `pred` is published and returns
    /// it. Returns `None` if the writer has gone away.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&Snapshot) -> bool) -> Option<Snapshot> {
        self.rx.wait_for(|s| pred(s)).await.ok().map(|s| s.clone())
    }
}
