use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connection state of the live session
///
/// `Idle → Connecting → Active → {Idle, Error}`; both `Error` and a manual
/// stop end in a fully released `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Active,
    Error,
}

impl ConnectionStatus {
    /// Whether `start()` may be called from this state
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation token for one engagement
///
/// Every asynchronous continuation checks this before producing a side
/// effect; raising it cannot preempt work already in flight.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that is already raised (nothing to stop)
    pub fn raised() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Raise the flag; returns `true` only for the call that raised it
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
