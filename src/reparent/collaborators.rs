//! Reparent Collaborators
//!
//! The coordinator sequences these operations but never performs them.
//! Each call is awaited before the next state begins.
//!
//! Implementations receive tablet snapshots by reference and must not
//! keep them past the call.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::errors::CollaboratorError;
use super::quorum::QuorumReport;
use crate::topology::{ReplicaSet, ReplicationPosition, ShardPath, Tablet, TabletPath};

/// Connection parameters of a freshly promoted master, handed to every
/// replica that is redirected to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterDescriptor {
    pub path: TabletPath,
    pub shard: ShardPath,
    pub address: String,
    /// Position replicas resume from
    pub position: ReplicationPosition,
}

impl fmt::Display for MasterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.path, self.address, self.position)
    }
}

/// Eligibility checks run before a graceful reparent.
#[async_trait]
pub trait ConsistencyGate: Send + Sync {
    /// Verify every replica's linkage and position.
    ///
    /// With `expected_master` set, each replica must point at it; with
    /// `None` replicas only need to be internally consistent.
    async fn check_replication(
        &self,
        replicas: &ReplicaSet,
        expected_master: Option<&TabletPath>,
    ) -> Result<(), CollaboratorError>;

    /// Verify the master-elect is fit for duty.
    async fn check_master_elect(&self, candidate: &Tablet) -> Result<(), CollaboratorError>;

    /// Verify the restartable replicas share one replication history.
    async fn check_consistency(&self, restartable: &ReplicaSet) -> Result<(), CollaboratorError>;
}

/// Breaks replication from the dead master during a forced reparent.
#[async_trait]
pub trait ReplicationBreaker: Send + Sync {
    async fn break_replication(
        &self,
        replicas: &ReplicaSet,
        candidate: &Tablet,
    ) -> Result<(), CollaboratorError>;
}

/// Makes a tablet the shard master.
#[async_trait]
pub trait Promoter: Send + Sync {
    async fn promote(&self, candidate: &Tablet) -> Result<MasterDescriptor, CollaboratorError>;
}

/// Redirects every replica in the set to a new master.
///
/// Must wait for every replica to settle and must not fail as a whole;
/// per-replica failures go into the report.
#[async_trait]
pub trait QuorumExecutor: Send + Sync {
    async fn redirect(&self, replicas: &ReplicaSet, master: &MasterDescriptor) -> QuorumReport;
}

/// Points one replica at a new master.
#[async_trait]
pub trait ReplicaRestarter: Send + Sync {
    async fn restart_replica(
        &self,
        replica: &Tablet,
        master: &MasterDescriptor,
    ) -> Result<(), CollaboratorError>;
}

/// Marks a tablet as permanently out of service.
#[async_trait]
pub trait Retirer: Send + Sync {
    async fn scrap(&self, tablet: &TabletPath, force: bool) -> Result<(), CollaboratorError>;
}

/// Durably records the result of a reparent.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finish_reparent(
        &self,
        master_elect: &Tablet,
        majority_restart: bool,
        leave_master_read_only: bool,
    ) -> Result<(), CollaboratorError>;
}

/// Every collaborator a coordinator needs.
///
/// Held behind `Arc` so the post-promotion steps can outlive the caller's
/// future.
#[derive(Clone)]
pub struct Collaborators {
    pub gate: Arc<dyn ConsistencyGate>,
    pub breaker: Arc<dyn ReplicationBreaker>,
    pub promoter: Arc<dyn Promoter>,
    pub redirector: Arc<dyn QuorumExecutor>,
    pub retirer: Arc<dyn Retirer>,
    pub finalizer: Arc<dyn Finalizer>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
