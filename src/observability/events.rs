//! Lifecycle events
//!
//! Process-level events logged outside a single reparent run. Events
//! inside a run are `reparent::ReparentEvent`.

use std::fmt;

/// Observable lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Topology file opened
    TopologyLoaded,
    /// Topology file could not be opened
    TopologyLoadFailed,
    /// CLI requested a reparent
    ReparentRequested,
    /// Reparent completed, every replica followed
    ReparentSucceeded,
    /// Reparent completed with a warning
    ReparentDegraded,
    /// Reparent aborted
    ReparentFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TopologyLoaded => "TOPOLOGY_LOADED",
            Event::TopologyLoadFailed => "TOPOLOGY_LOAD_FAILED",
            Event::ReparentRequested => "REPARENT_REQUESTED",
            Event::ReparentSucceeded => "REPARENT_SUCCEEDED",
            Event::ReparentDegraded => "REPARENT_DEGRADED",
            Event::ReparentFailed => "REPARENT_FAILED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::TopologyLoadFailed | Event::ReparentFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
