//! Reparent Observability
//!
//! Every state entry and every outcome of a run is recorded as a
//! `ReparentEvent` and logged as one JSON line tagged with the run's
//! operation id, shard and master-elect.
//!
//! Observability describes what happened; it never decides what happens.
//! A logging failure never changes the run.

use uuid::Uuid;

use super::state::{ReparentMode, ReparentState};
use crate::observability::{Logger, Severity};
use crate::topology::{ShardPath, TabletPath};

/// Reparent event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReparentEvent {
    /// reparent.requested
    Requested { mode: ReparentMode },

    /// reparent.state_entered
    StateEntered { state: ReparentState },

    /// reparent.rejected
    /// Emitted when a fatal error ends the run before promotion.
    Rejected { state: ReparentState, reason: String },

    /// reparent.promoted
    Promoted { new_master: TabletPath, address: String },

    /// reparent.quorum_result
    QuorumResult {
        attempted: usize,
        succeeded: usize,
        majority_achieved: bool,
    },

    /// reparent.retire_skipped
    /// Forced runs never scrap the failed master.
    RetireSkipped { tablet: TabletPath },

    /// reparent.retired
    Retired { tablet: TabletPath },

    /// reparent.retire_failed
    RetireFailed { tablet: TabletPath, reason: String },

    /// reparent.finalized
    Finalized {
        new_master: TabletPath,
        majority_restart: bool,
        master_read_only: bool,
    },

    /// reparent.aborted
    /// Emitted when a fatal error ends the run after promotion was issued.
    Aborted { state: ReparentState, reason: String },

    /// reparent.completed
    Completed { degraded: bool },
}

impl ReparentEvent {
    /// Get the event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Requested { .. } => "reparent.requested",
            Self::StateEntered { .. } => "reparent.state_entered",
            Self::Rejected { .. } => "reparent.rejected",
            Self::Promoted { .. } => "reparent.promoted",
            Self::QuorumResult { .. } => "reparent.quorum_result",
            Self::RetireSkipped { .. } => "reparent.retire_skipped",
            Self::Retired { .. } => "reparent.retired",
            Self::RetireFailed { .. } => "reparent.retire_failed",
            Self::Finalized { .. } => "reparent.finalized",
            Self::Aborted { .. } => "reparent.aborted",
            Self::Completed { .. } => "reparent.completed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::StateEntered { .. } => Severity::Trace,
            Self::QuorumResult {
                attempted,
                succeeded,
                ..
            } if succeeded < attempted => Severity::Warn,
            Self::RetireFailed { .. } => Severity::Warn,
            Self::Completed { degraded: true } => Severity::Warn,
            Self::Rejected { .. } => Severity::Error,
            Self::Aborted { .. } => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    /// Event-specific log fields.
    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Requested { mode } => vec![("mode", mode.to_string())],
            Self::StateEntered { state } => vec![("state", state.state_name().to_string())],
            Self::Rejected { state, reason } | Self::Aborted { state, reason } => vec![
                ("state", state.state_name().to_string()),
                ("reason", reason.clone()),
            ],
            Self::Promoted {
                new_master,
                address,
            } => vec![
                ("new_master", new_master.to_string()),
                ("address", address.clone()),
            ],
            Self::QuorumResult {
                attempted,
                succeeded,
                majority_achieved,
            } => vec![
                ("attempted", attempted.to_string()),
                ("succeeded", succeeded.to_string()),
                ("majority_achieved", majority_achieved.to_string()),
            ],
            Self::RetireSkipped { tablet } | Self::Retired { tablet } => {
                vec![("tablet", tablet.to_string())]
            }
            Self::RetireFailed { tablet, reason } => vec![
                ("tablet", tablet.to_string()),
                ("reason", reason.clone()),
            ],
            Self::Finalized {
                new_master,
                majority_restart,
                master_read_only,
            } => vec![
                ("new_master", new_master.to_string()),
                ("majority_restart", majority_restart.to_string()),
                ("master_read_only", master_read_only.to_string()),
            ],
            Self::Completed { degraded } => vec![("degraded", degraded.to_string())],
        }
    }
}

/// Collects the events of one reparent run and logs each as it arrives.
///
/// Also tracks the run's position on the state path for its mode.
#[derive(Debug)]
pub struct ReparentObserver {
    operation_id: Uuid,
    shard: ShardPath,
    master_elect: TabletPath,
    mode: ReparentMode,
    current: Option<ReparentState>,
    events: Vec<ReparentEvent>,
}

impl ReparentObserver {
    pub fn new(
        operation_id: Uuid,
        shard: ShardPath,
        master_elect: TabletPath,
        mode: ReparentMode,
    ) -> Self {
        Self {
            operation_id,
            shard,
            master_elect,
            mode,
            current: None,
            events: Vec::new(),
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Record and log an event.
    pub fn emit(&mut self, event: ReparentEvent) {
        let operation_id = self.operation_id.to_string();
        let specific = event.fields();

        let mut fields: Vec<(&str, &str)> = vec![
            ("operation_id", operation_id.as_str()),
            ("shard", self.shard.as_str()),
            ("master_elect", self.master_elect.as_str()),
        ];
        fields.extend(specific.iter().map(|(k, v)| (*k, v.as_str())));

        Logger::log(event.severity(), event.event_name(), &fields);
        self.events.push(event);
    }

    /// Enter the next state on this run's path and return it.
    ///
    /// The first call enters Start. Done has no successor and is re-entered.
    pub fn advance(&mut self) -> ReparentState {
        let state = match self.current {
            None => ReparentState::Start,
            Some(current) => current.next(self.mode).unwrap_or(current),
        };
        self.current = Some(state);
        self.emit(ReparentEvent::StateEntered { state });
        state
    }

    /// Get all emitted events.
    pub fn events(&self) -> &[ReparentEvent] {
        &self.events
    }
}
