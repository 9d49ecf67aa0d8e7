//! Reparent Request
//!
//! Everything one reparent run needs, built by the caller for a single
//! invocation and consumed by it.

use super::errors::{ReparentError, ReparentErrorKind, ReparentResult};
use super::state::{ReparentMode, ReparentState};
use crate::topology::{ReplicaSet, ShardPath, Tablet};

/// A request to install `master_elect` as master of `failed_master`'s shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparentRequest {
    /// Known replicas of the shard, excluding the failed master
    pub replica_set: ReplicaSet,

    /// Master believed dead
    pub failed_master: Tablet,

    /// Tablet to promote
    pub master_elect: Tablet,

    /// Keep the new master read-only after the reparent
    pub leave_master_read_only: bool,

    pub mode: ReparentMode,
}

impl ReparentRequest {
    /// Create a graceful request that leaves the new master writable.
    pub fn new(replica_set: ReplicaSet, failed_master: Tablet, master_elect: Tablet) -> Self {
        Self {
            replica_set,
            failed_master,
            master_elect,
            leave_master_read_only: false,
            mode: ReparentMode::Graceful,
        }
    }

    /// Set force flag.
    pub fn with_force(mut self, force: bool) -> Self {
        self.mode = ReparentMode::from_force(force);
        self
    }

    pub fn with_leave_master_read_only(mut self, read_only: bool) -> Self {
        self.leave_master_read_only = read_only;
        self
    }

    /// Shard being reparented.
    pub fn shard(&self) -> &ShardPath {
        &self.failed_master.shard
    }

    /// Validate the request shape (not safety).
    ///
    /// Forced mode is allowed to reparent to the failed master itself: the
    /// caller is reusing the same tablet after an external resync.
    pub fn validate(&self) -> ReparentResult<()> {
        let shard = self.shard();
        let elect = &self.master_elect;

        let invalid = |message: String| {
            ReparentError::new(
                ReparentErrorKind::InvalidRequest,
                ReparentState::Start,
                shard,
                &elect.path,
                message,
            )
        };

        if &elect.shard != shard {
            return Err(invalid(format!(
                "master elect {} belongs to shard {}, failed master {} to shard {}",
                elect.path, elect.shard, self.failed_master.path, shard
            )));
        }

        if !self.mode.is_forced() && elect.path == self.failed_master.path {
            return Err(invalid(format!(
                "master elect {} is the failed master; only a forced reparent may reuse it",
                elect.path
            )));
        }

        if self.replica_set.contains(&self.failed_master.path) {
            return Err(invalid(format!(
                "failed master {} is listed as a replica",
                self.failed_master.path
            )));
        }

        if let Some(foreign) = self.replica_set.iter().find(|t| &t.shard != shard) {
            return Err(invalid(format!(
                "replica {} belongs to shard {}, not {}",
                foreign.path, foreign.shard, shard
            )));
        }

        Ok(())
    }
}
