//! Reparent Coordinator
//!
//! Drives one reparent through the state machine in `state.rs`. Every
//! collaborator call is awaited before the next state begins and nothing
//! is retried.
//!
//! Cancellation:
//! - Before Promotion the run lives in the caller's future. Dropping it
//!   leaves the cluster untouched.
//! - From Promotion on the run moves to a spawned task that owns its data,
//!   so dropping the caller's future no longer stops Promotion through
//!   Finalize. A task that dies without reporting yields `Interrupted`.

use uuid::Uuid;

use super::collaborators::{Collaborators, MasterDescriptor};
use super::config::ReparentConfig;
use super::errors::{CollaboratorError, ReparentError, ReparentErrorKind, ReparentResult};
use super::observability::{ReparentEvent, ReparentObserver};
use super::outcome::ReparentOutcome;
use super::request::ReparentRequest;
use super::state::{ReparentMode, ReparentState};

/// Runs reparents against a fixed set of collaborators.
///
/// Holds no state across runs. Serializing runs per shard is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct ReparentCoordinator {
    collaborators: Collaborators,
    config: ReparentConfig,
}

impl ReparentCoordinator {
    pub fn new(collaborators: Collaborators, config: ReparentConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &ReparentConfig {
        &self.config
    }

    /// Make `request.master_elect` the master of its shard.
    ///
    /// Returns the outcome once the new master is recorded; a warning on it
    /// means some replicas did not follow. Any error before Promotion
    /// leaves the cluster unchanged (`ReparentError::cluster_unchanged`).
    pub async fn reparent(&self, request: ReparentRequest) -> ReparentResult<ReparentOutcome> {
        let operation_id = Uuid::new_v4();
        let shard = request.shard().clone();
        let elect_path = request.master_elect.path.clone();

        let mut observer = ReparentObserver::new(
            operation_id,
            shard.clone(),
            elect_path.clone(),
            request.mode,
        );
        observer.emit(ReparentEvent::Requested { mode: request.mode });
        observer.advance();

        if let Err(error) = request.validate() {
            return Err(fail(&mut observer, error));
        }

        if let Err(error) = self.prepare(&request, &mut observer).await {
            return Err(fail(&mut observer, error));
        }

        let run = PromotedRun {
            collaborators: self.collaborators.clone(),
            scrap_force: self.config.scrap_force,
            request,
            observer,
        };

        match tokio::spawn(run.execute()).await {
            Ok(result) => result,
            Err(join_error) => Err(ReparentError::new(
                ReparentErrorKind::Interrupted,
                ReparentState::Promotion,
                &shard,
                &elect_path,
                format!(
                    "post-promotion task stopped without reporting (operation {}): {}",
                    operation_id, join_error
                ),
            )),
        }
    }

    /// CandidateMembership, then EligibilityCheck or ForcedDetach.
    async fn prepare(
        &self,
        request: &ReparentRequest,
        observer: &mut ReparentObserver,
    ) -> ReparentResult<()> {
        let shard = request.shard();
        let elect = &request.master_elect;
        let replicas = &request.replica_set;

        let state = observer.advance();
        if request.mode == ReparentMode::Graceful && !replicas.contains(&elect.path) {
            return Err(ReparentError::new(
                ReparentErrorKind::CandidateNotInReplicaSet,
                state,
                shard,
                &elect.path,
                format!(
                    "master-elect tablet {} not found in replication graph of shard {}: {}",
                    elect.path,
                    shard,
                    replicas.describe_paths()
                ),
            ));
        }

        // EligibilityCheck or ForcedDetach, by mode
        let state = observer.advance();
        match request.mode {
            ReparentMode::Graceful => {
                let gate = &self.collaborators.gate;
                let rejected = |message: &str, source: CollaboratorError| {
                    ReparentError::new(
                        ReparentErrorKind::EligibilityCheckFailed,
                        state,
                        shard,
                        &elect.path,
                        message,
                    )
                    .with_source(source)
                };

                gate.check_replication(replicas, None)
                    .await
                    .map_err(|e| rejected("replica set failed the replication check", e))?;
                gate.check_master_elect(elect)
                    .await
                    .map_err(|e| rejected("master-elect failed the fitness check", e))?;
                gate.check_consistency(&replicas.restartable())
                    .await
                    .map_err(|e| rejected("restartable replicas are not consistent", e))?;
            }
            ReparentMode::Forced => {
                self.collaborators
                    .breaker
                    .break_replication(replicas, elect)
                    .await
                    .map_err(|e| {
                        ReparentError::new(
                            ReparentErrorKind::ForcedDetachFailed,
                            state,
                            shard,
                            &elect.path,
                            "break replication from the failed master failed",
                        )
                        .with_source(e)
                    })?;
            }
        }

        Ok(())
    }
}

/// Record a fatal exit and hand the error back.
fn fail(observer: &mut ReparentObserver, error: ReparentError) -> ReparentError {
    debug_assert!(error.state.can_fail_fatally(), "{} cannot end a run", error.state);
    let event = if error.cluster_unchanged() {
        ReparentEvent::Rejected {
            state: error.state,
            reason: error.to_string(),
        }
    } else {
        ReparentEvent::Aborted {
            state: error.state,
            reason: error.to_string(),
        }
    };
    observer.emit(event);
    error
}

/// Promotion through Done. Owns everything it touches so it can run on
/// its own task.
struct PromotedRun {
    collaborators: Collaborators,
    scrap_force: bool,
    request: ReparentRequest,
    observer: ReparentObserver,
}

impl PromotedRun {
    async fn execute(mut self) -> ReparentResult<ReparentOutcome> {
        match self.advance().await {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(fail(&mut self.observer, error)),
        }
    }

    async fn advance(&mut self) -> ReparentResult<ReparentOutcome> {
        let collaborators = &self.collaborators;
        let request = &mut self.request;
        let observer = &mut self.observer;
        let shard = request.failed_master.shard.clone();
        let elect = request.master_elect.clone();

        let state = observer.advance();
        let new_master: MasterDescriptor =
            collaborators.promoter.promote(&elect).await.map_err(|e| {
                ReparentError::new(
                    ReparentErrorKind::PromotionFailed,
                    state,
                    &shard,
                    &elect.path,
                    "promote slave failed",
                )
                .with_source(e)
            })?;
        observer.emit(ReparentEvent::Promoted {
            new_master: new_master.path.clone(),
            address: new_master.address.clone(),
        });

        // SetUpdate: the elect is already absent on a forced replay
        observer.advance();
        request.replica_set.remove(&elect.path);

        // QuorumRedirect
        observer.advance();
        let report = collaborators
            .redirector
            .redirect(&request.replica_set, &new_master)
            .await;
        let majority_achieved = report.majority_achieved();
        let warning = report.warning();
        observer.emit(ReparentEvent::QuorumResult {
            attempted: report.attempted,
            succeeded: report.succeeded.len(),
            majority_achieved,
        });

        // Retire
        observer.advance();
        let failed_master = request.failed_master.path.clone();
        match request.mode {
            ReparentMode::Forced => {
                observer.emit(ReparentEvent::RetireSkipped {
                    tablet: failed_master,
                });
            }
            ReparentMode::Graceful => {
                match collaborators
                    .retirer
                    .scrap(&failed_master, self.scrap_force)
                    .await
                {
                    Ok(()) => observer.emit(ReparentEvent::Retired {
                        tablet: failed_master,
                    }),
                    Err(e) => observer.emit(ReparentEvent::RetireFailed {
                        tablet: failed_master,
                        reason: e.to_string(),
                    }),
                }
            }
        }

        let state = observer.advance();
        collaborators
            .finalizer
            .finish_reparent(&elect, majority_achieved, request.leave_master_read_only)
            .await
            .map_err(|e| {
                ReparentError::new(
                    ReparentErrorKind::FinalizeFailed,
                    state,
                    &shard,
                    &elect.path,
                    "finish reparent failed",
                )
                .with_source(e)
            })?;
        observer.emit(ReparentEvent::Finalized {
            new_master: elect.path.clone(),
            majority_restart: majority_achieved,
            master_read_only: request.leave_master_read_only,
        });

        observer.advance();
        observer.emit(ReparentEvent::Completed {
            degraded: warning.is_some(),
        });

        Ok(ReparentOutcome {
            operation_id: observer.operation_id(),
            mode: request.mode,
            new_master,
            majority_achieved,
            warning,
            events: observer.events().to_vec(),
        })
    }
}
