//! Shard Reparent
//!
//! Replaces a failed shard master with a master-elect:
//!
//! 1. Check the candidate belongs to the replica set (graceful only)
//! 2. Verify replica and candidate consistency, or break replication
//!    from the dead master when forced
//! 3. Promote the candidate
//! 4. Redirect the remaining replicas to it, tolerating a minority of
//!    failures
//! 5. Scrap the failed master (graceful only, best effort)
//! 6. Record the new master
//!
//! Errors before step 3 leave the cluster unchanged. A reparent that gets
//! past step 6 succeeds, possibly with a warning about replicas that did
//! not follow.

mod collaborators;
mod config;
mod coordinator;
mod errors;
mod observability;
mod outcome;
mod quorum;
mod request;
mod state;

pub use collaborators::{
    Collaborators, ConsistencyGate, Finalizer, MasterDescriptor, Promoter, QuorumExecutor,
    ReplicaRestarter, ReplicationBreaker, Retirer,
};
pub use config::{ReparentConfig, DEFAULT_REDIRECT_TIMEOUT};
pub use coordinator::ReparentCoordinator;
pub use errors::{
    CollaboratorError, RedirectFailure, ReparentError, ReparentErrorKind, ReparentResult,
    ReparentWarning,
};
pub use observability::{ReparentEvent, ReparentObserver};
pub use outcome::{OutcomeSummary, ReparentOutcome};
pub use quorum::{is_majority, ParallelRedirector, QuorumReport};
pub use request::ReparentRequest;
pub use state::{ReparentMode, ReparentState};
