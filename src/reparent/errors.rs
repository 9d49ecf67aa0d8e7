//! Reparent Error Types
//!
//! Two disjoint classes:
//! - `ReparentError`: fatal. The run stopped at the state that raised it.
//! - `ReparentWarning`: degraded. The run completed and the new master was
//!   recorded, but some cleanup or redirect did not.
//!
//! Collaborators report failures as `CollaboratorError`; the coordinator
//! decides which class a collaborator failure falls into.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::state::ReparentState;
use crate::topology::{ShardPath, TabletPath, TopologyError};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Tablet did not answer
    #[error("tablet {0} is unreachable")]
    Unreachable(TabletPath),

    /// Tablet failed an eligibility or fitness check
    #[error("tablet {tablet} is not eligible: {reason}")]
    Ineligible { tablet: TabletPath, reason: String },

    /// Replicas disagree about replication history
    #[error("replication histories conflict: {0}")]
    Inconsistent(String),

    /// Per-call deadline elapsed
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Metadata store failure
    #[error("topology store: {0}")]
    Topology(String),

    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn ineligible(tablet: &TabletPath, reason: impl Into<String>) -> Self {
        Self::Ineligible {
            tablet: tablet.clone(),
            reason: reason.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<TopologyError> for CollaboratorError {
    fn from(e: TopologyError) -> Self {
        Self::Topology(e.to_string())
    }
}

/// Fatal reparent error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparentErrorKind {
    /// Request is malformed (shard mismatch, master-elect is the failed
    /// master in graceful mode, foreign replicas)
    InvalidRequest,

    /// Graceful reparent to a tablet outside the replica set
    CandidateNotInReplicaSet,

    /// Consistency gate rejected the replica set or the candidate
    EligibilityCheckFailed,

    /// Could not break replication from the dead master
    ForcedDetachFailed,

    /// Master-elect could not be promoted. Likely dead or unreachable;
    /// retry with another candidate or escalate to an operator.
    PromotionFailed,

    /// New topology could not be recorded
    FinalizeFailed,

    /// Post-promotion task stopped without reporting
    Interrupted,
}

impl ReparentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::CandidateNotInReplicaSet => "CANDIDATE_NOT_IN_REPLICA_SET",
            Self::EligibilityCheckFailed => "ELIGIBILITY_CHECK_FAILED",
            Self::ForcedDetachFailed => "FORCED_DETACH_FAILED",
            Self::PromotionFailed => "PROMOTION_FAILED",
            Self::FinalizeFailed => "FINALIZE_FAILED",
            Self::Interrupted => "INTERRUPTED",
        }
    }
}

/// Fatal reparent error.
#[derive(Debug, Clone)]
pub struct ReparentError {
    /// Error kind
    pub kind: ReparentErrorKind,
    /// State the run was in when it stopped
    pub state: ReparentState,
    /// Shard being reparented
    pub shard: ShardPath,
    /// Tablet the failure is about
    pub tablet: TabletPath,
    /// Error message
    pub message: String,
    source: Option<CollaboratorError>,
}

impl ReparentError {
    pub fn new(
        kind: ReparentErrorKind,
        state: ReparentState,
        shard: &ShardPath,
        tablet: &TabletPath,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            state,
            shard: shard.clone(),
            tablet: tablet.clone(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the collaborator failure that caused this error.
    pub fn with_source(mut self, source: CollaboratorError) -> Self {
        self.source = Some(source);
        self
    }

    /// Underlying collaborator failure, if any.
    pub fn collaborator_error(&self) -> Option<&CollaboratorError> {
        self.source.as_ref()
    }

    /// True when the run stopped before promotion: no failover happened.
    pub fn cluster_unchanged(&self) -> bool {
        !self.state.is_past_point_of_no_return()
    }

    /// True when the candidate could not be promoted.
    pub fn is_promotion_failure(&self) -> bool {
        self.kind == ReparentErrorKind::PromotionFailed
    }
}

impl fmt::Display for ReparentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReparentError({}) in {} for {} on {}: {}",
            self.kind.as_str(),
            self.state.state_name(),
            self.tablet,
            self.shard,
            self.message
        )?;
        if let Some(source) = &self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReparentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for reparent operations
pub type ReparentResult<T> = Result<T, ReparentError>;

/// One replica that did not accept the new master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectFailure {
    pub tablet: TabletPath,
    pub error: CollaboratorError,
}

impl fmt::Display for RedirectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tablet, self.error)
    }
}

fn list_failures(failures: &[RedirectFailure]) -> String {
    failures
        .iter()
        .map(RedirectFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Non-fatal outcome of a completed reparent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReparentWarning {
    /// Some replicas were not redirected to the new master
    #[error(
        "{succeeded}/{attempted} replicas redirected (majority: {majority_achieved}); failed: {}",
        list_failures(.failures)
    )]
    QuorumDegraded {
        attempted: usize,
        succeeded: usize,
        majority_achieved: bool,
        failures: Vec<RedirectFailure>,
    },
}

impl ReparentWarning {
    /// Replicas that did not follow the new master.
    pub fn failed_replicas(&self) -> Vec<&TabletPath> {
        match self {
            Self::QuorumDegraded { failures, .. } => {
                failures.iter().map(|failure| &failure.tablet).collect()
            }
        }
    }
}
