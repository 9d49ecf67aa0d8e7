//! Reparent State Machine
//!
//! States run strictly in order, each at most once:
//!
//! ```text
//! Start → CandidateMembership → {EligibilityCheck | ForcedDetach} → Promotion
//!       → SetUpdate → QuorumRedirect → Retire → Finalize → Done
//! ```
//!
//! The mode selects which of EligibilityCheck and ForcedDetach runs; the
//! rest of the path is the same for both modes. Retire is entered in both
//! modes and does nothing when forced.
//!
//! Fatal exits are attached to Start (request validation),
//! CandidateMembership, EligibilityCheck, ForcedDetach, Promotion and
//! Finalize. QuorumRedirect and Retire never end the run early.

use std::fmt;

use serde::Serialize;

/// How the reparent treats the replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReparentMode {
    /// Verify replica and candidate consistency before promoting.
    Graceful,

    /// Caller asserts the master-elect holds externally synchronized data.
    /// Consistency checks are skipped, replication from the dead master is
    /// broken explicitly, and the failed master is not scrapped (it may be
    /// the same tablet being reused).
    Forced,
}

impl ReparentMode {
    pub fn from_force(force: bool) -> Self {
        if force {
            Self::Forced
        } else {
            Self::Graceful
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Forced)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Forced => "forced",
        }
    }
}

impl fmt::Display for ReparentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReparentState {
    Start,
    CandidateMembership,
    EligibilityCheck,
    ForcedDetach,
    Promotion,
    SetUpdate,
    QuorumRedirect,
    Retire,
    Finalize,
    Done,
}

impl ReparentState {
    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::CandidateMembership => "CandidateMembership",
            Self::EligibilityCheck => "EligibilityCheck",
            Self::ForcedDetach => "ForcedDetach",
            Self::Promotion => "Promotion",
            Self::SetUpdate => "SetUpdate",
            Self::QuorumRedirect => "QuorumRedirect",
            Self::Retire => "Retire",
            Self::Finalize => "Finalize",
            Self::Done => "Done",
        }
    }

    /// Successor of this state under `mode`. `None` once Done.
    pub fn next(self, mode: ReparentMode) -> Option<Self> {
        let next = match self {
            Self::Start => Self::CandidateMembership,
            Self::CandidateMembership => match mode {
                ReparentMode::Graceful => Self::EligibilityCheck,
                ReparentMode::Forced => Self::ForcedDetach,
            },
            Self::EligibilityCheck | Self::ForcedDetach => Self::Promotion,
            Self::Promotion => Self::SetUpdate,
            Self::SetUpdate => Self::QuorumRedirect,
            Self::QuorumRedirect => Self::Retire,
            Self::Retire => Self::Finalize,
            Self::Finalize => Self::Done,
            Self::Done => return None,
        };
        Some(next)
    }

    /// Whether a failure in this state ends the run.
    pub fn can_fail_fatally(&self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::CandidateMembership
                | Self::EligibilityCheck
                | Self::ForcedDetach
                | Self::Promotion
                | Self::Finalize
        )
    }

    /// Whether promotion has been issued on entry to this state.
    ///
    /// From Promotion onward abandoning the run would leave the metadata
    /// store disagreeing with the cluster.
    pub fn is_past_point_of_no_return(&self) -> bool {
        matches!(
            self,
            Self::Promotion
                | Self::SetUpdate
                | Self::QuorumRedirect
                | Self::Retire
                | Self::Finalize
                | Self::Done
        )
    }

    /// Full state path for `mode`, Start through Done.
    pub fn path(mode: ReparentMode) -> Vec<Self> {
        let mut states = vec![Self::Start];
        let mut current = Self::Start;
        while let Some(next) = current.next(mode) {
            states.push(next);
            current = next;
        }
        states
    }
}

impl fmt::Display for ReparentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}
