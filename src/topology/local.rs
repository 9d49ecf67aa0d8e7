//! Local Cluster
//!
//! Implements every reparent collaborator against a `TopologyStore`, so a
//! reparent can run end to end without live tablets. Tablet health stands
//! in for reachability: an `Unreachable` or `Failed` tablet refuses every
//! operation that would have to talk to it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::errors::TopologyResult;
use super::replica_set::ReplicaSet;
use super::store::TopologyStore;
use super::tablet::{ReplicationPosition, ShardPath, Tablet, TabletHealth, TabletPath, TabletRole};
use crate::reparent::{
    CollaboratorError, Collaborators, ConsistencyGate, Finalizer, MasterDescriptor,
    ParallelRedirector, Promoter, ReparentConfig, ReparentRequest, ReplicaRestarter,
    ReplicationBreaker, Retirer,
};

/// Collaborators backed by a topology store.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    store: Arc<TopologyStore>,
}

impl LocalCluster {
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    /// Wire this cluster into every collaborator slot.
    pub fn collaborators(self: &Arc<Self>, config: &ReparentConfig) -> Collaborators {
        Collaborators {
            gate: self.clone(),
            breaker: self.clone(),
            promoter: self.clone(),
            redirector: Arc::new(ParallelRedirector::new(
                self.clone(),
                config.redirect_timeout,
            )),
            retirer: self.clone(),
            finalizer: self.clone(),
        }
    }

    /// Build a request from the stored topology: the recorded master is
    /// the failed master, every other live tablet of the shard a replica.
    pub fn build_request(
        &self,
        shard: &ShardPath,
        master_elect: &TabletPath,
        force: bool,
        leave_master_read_only: bool,
    ) -> TopologyResult<ReparentRequest> {
        let failed_master = self.store.master(shard)?;
        let replica_set = self.store.replica_set(shard)?;
        let master_elect = self.store.tablet(master_elect)?;

        Ok(
            ReparentRequest::new(replica_set, failed_master, master_elect)
                .with_force(force)
                .with_leave_master_read_only(leave_master_read_only),
        )
    }

    /// Run store work on the blocking pool. Writes fsync the topology
    /// file, which must not stall the runtime's worker threads.
    async fn with_store<T, F>(&self, work: F) -> Result<T, CollaboratorError>
    where
        F: FnOnce(&TopologyStore) -> Result<T, CollaboratorError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| CollaboratorError::other(format!("topology task failed: {}", e)))?
    }
}

/// Current stored state of a tablet that must be reachable.
fn reachable(store: &TopologyStore, path: &TabletPath) -> Result<Tablet, CollaboratorError> {
    let tablet = store.tablet(path)?;
    if tablet.health != TabletHealth::Healthy {
        return Err(CollaboratorError::Unreachable(path.clone()));
    }
    Ok(tablet)
}

#[async_trait]
impl ConsistencyGate for LocalCluster {
    /// Every replica must still be registered where the snapshot says,
    /// replicate from the expected master if one is given, and hold a
    /// stored position caught up to its snapshot position.
    async fn check_replication(
        &self,
        replicas: &ReplicaSet,
        expected_master: Option<&TabletPath>,
    ) -> Result<(), CollaboratorError> {
        let replicas = replicas.clone();
        let expected_master = expected_master.cloned();

        self.with_store(move |store| {
            for replica in &replicas {
                if !replica.role.follows_master() {
                    return Err(CollaboratorError::ineligible(
                        &replica.path,
                        format!("role {} does not replicate", replica.role),
                    ));
                }

                let stored = store.tablet(&replica.path)?;
                if stored.shard != replica.shard {
                    return Err(CollaboratorError::ineligible(
                        &replica.path,
                        format!("registered to shard {}", stored.shard),
                    ));
                }

                // Behind the snapshot, or moved to another history since it was taken
                if !stored.position.is_caught_up_to(&replica.position) {
                    return Err(CollaboratorError::ineligible(
                        &replica.path,
                        format!(
                            "at {}, not caught up to snapshot position {}",
                            stored.position, replica.position
                        ),
                    ));
                }

                if let Some(expected) = &expected_master {
                    if stored.parent.as_ref() != Some(expected) {
                        let actual = stored
                            .parent
                            .as_ref()
                            .map_or("nothing".to_string(), TabletPath::to_string);
                        return Err(CollaboratorError::ineligible(
                            &replica.path,
                            format!("replicates from {}, expected {}", actual, expected),
                        ));
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn check_master_elect(&self, candidate: &Tablet) -> Result<(), CollaboratorError> {
        let path = candidate.path.clone();
        self.with_store(move |store| {
            let stored = reachable(store, &path)?;
            if stored.role == TabletRole::Scrap {
                return Err(CollaboratorError::ineligible(&path, "tablet is scrapped"));
            }
            Ok(())
        })
        .await
    }

    async fn check_consistency(&self, restartable: &ReplicaSet) -> Result<(), CollaboratorError> {
        let restartable = restartable.clone();
        self.with_store(move |store| {
            let mut positions = Vec::with_capacity(restartable.len());
            for replica in &restartable {
                let stored = store.tablet(&replica.path)?;
                positions.push((stored.path, stored.position));
            }

            let Some((first_path, first)) = positions.first() else {
                return Ok(());
            };
            for (path, position) in &positions[1..] {
                if !position.shares_history_with(first) {
                    return Err(CollaboratorError::Inconsistent(format!(
                        "{} at {} diverges from {} at {}",
                        path, position, first_path, first
                    )));
                }
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ReplicationBreaker for LocalCluster {
    async fn break_replication(
        &self,
        _replicas: &ReplicaSet,
        candidate: &Tablet,
    ) -> Result<(), CollaboratorError> {
        let path = candidate.path.clone();
        self.with_store(move |store| {
            reachable(store, &path)?;
            store.update_tablet(&path, |tablet| {
                tablet.parent = None;
            })?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Promoter for LocalCluster {
    /// Promotion opens a new replication history at the candidate.
    async fn promote(&self, candidate: &Tablet) -> Result<MasterDescriptor, CollaboratorError> {
        let path = candidate.path.clone();
        self.with_store(move |store| {
            let current = reachable(store, &path)?;
            if current.role == TabletRole::Scrap {
                return Err(CollaboratorError::ineligible(&path, "tablet is scrapped"));
            }

            let epoch = current.position.epoch.checked_add(1).ok_or_else(|| {
                CollaboratorError::ineligible(
                    &path,
                    format!("replication epoch {} cannot advance", current.position.epoch),
                )
            })?;
            let position = ReplicationPosition::new(epoch, 0);
            let promoted = store.update_tablet(&path, |tablet| {
                tablet.role = TabletRole::Master;
                tablet.parent = None;
                tablet.position = position;
            })?;

            Ok(MasterDescriptor {
                path: promoted.path,
                shard: promoted.shard,
                address: promoted.address,
                position: promoted.position,
            })
        })
        .await
    }
}

#[async_trait]
impl ReplicaRestarter for LocalCluster {
    async fn restart_replica(
        &self,
        replica: &Tablet,
        master: &MasterDescriptor,
    ) -> Result<(), CollaboratorError> {
        let path = replica.path.clone();
        let master_path = master.path.clone();
        let master_position = master.position;

        self.with_store(move |store| {
            let current = reachable(store, &path)?;
            if !current.role.follows_master() {
                return Err(CollaboratorError::ineligible(
                    &path,
                    format!("role {} cannot follow a master", current.role),
                ));
            }

            store.update_tablet(&path, |tablet| {
                tablet.parent = Some(master_path);
                tablet.position = master_position;
            })?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Retirer for LocalCluster {
    /// Without `force`, a master that still answers is left alone.
    async fn scrap(&self, tablet: &TabletPath, force: bool) -> Result<(), CollaboratorError> {
        let path = tablet.clone();
        self.with_store(move |store| {
            let current = store.tablet(&path)?;
            if !force
                && current.role == TabletRole::Master
                && current.health == TabletHealth::Healthy
            {
                return Err(CollaboratorError::ineligible(
                    &path,
                    "master is still healthy; scrapping it requires force",
                ));
            }

            store.update_tablet(&path, |t| {
                t.role = TabletRole::Scrap;
                t.parent = None;
            })?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl Finalizer for LocalCluster {
    async fn finish_reparent(
        &self,
        master_elect: &Tablet,
        majority_restart: bool,
        leave_master_read_only: bool,
    ) -> Result<(), CollaboratorError> {
        let shard = master_elect.shard.clone();
        let master = master_elect.path.clone();

        self.with_store(move |store| {
            store.update_shard_record(&shard, |record| {
                record.master = Some(master);
                record.majority_restart = Some(majority_restart);
                record.master_read_only = leave_master_read_only;
                record.reparented_at = Some(Utc::now());
            })?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyDocument;

    fn shard() -> ShardPath {
        ShardPath::parse("commerce/0").unwrap()
    }

    fn path(raw: &str) -> TabletPath {
        TabletPath::parse(raw).unwrap()
    }

    fn tablet(raw: &str, role: TabletRole) -> Tablet {
        Tablet::new(path(raw), shard(), role)
            .with_address(format!("{}.db:3306", raw))
            .with_position(ReplicationPosition::new(4, 900))
    }

    fn cluster() -> LocalCluster {
        let document = TopologyDocument::new()
            .with_tablet(tablet("zone1-100", TabletRole::Master).with_health(TabletHealth::Failed))
            .unwrap()
            .with_tablet(tablet("zone1-101", TabletRole::Replica).with_parent(path("zone1-100")))
            .unwrap()
            .with_tablet(tablet("zone1-102", TabletRole::Replica).with_parent(path("zone1-100")))
            .unwrap();
        LocalCluster::new(Arc::new(TopologyStore::in_memory(document)))
    }

    #[tokio::test]
    async fn test_replication_check_honors_hint() {
        let cluster = cluster();
        let replicas = cluster.store().replica_set(&shard()).unwrap();

        assert!(cluster.check_replication(&replicas, None).await.is_ok());
        assert!(cluster
            .check_replication(&replicas, Some(&path("zone1-100")))
            .await
            .is_ok());

        let err = cluster
            .check_replication(&replicas, Some(&path("zone1-101")))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Ineligible { .. }));
    }

    #[tokio::test]
    async fn test_replication_check_rejects_stale_positions() {
        let cluster = cluster();
        let replicas = cluster.store().replica_set(&shard()).unwrap();

        // Ahead of the snapshot in the same history is fine
        cluster
            .store()
            .update_tablet(&path("zone1-101"), |t| {
                t.position = ReplicationPosition::new(4, 1_500)
            })
            .unwrap();
        assert!(cluster.check_replication(&replicas, None).await.is_ok());

        cluster
            .store()
            .update_tablet(&path("zone1-102"), |t| {
                t.position = ReplicationPosition::new(4, 300)
            })
            .unwrap();
        let err = cluster
            .check_replication(&replicas, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CollaboratorError::ineligible(
                &path("zone1-102"),
                "at 4:300, not caught up to snapshot position 4:900"
            )
        );
    }

    #[tokio::test]
    async fn test_replication_check_rejects_new_history() {
        let cluster = cluster();
        let replicas = cluster.store().replica_set(&shard()).unwrap();
        cluster
            .store()
            .update_tablet(&path("zone1-101"), |t| {
                t.position = ReplicationPosition::new(5, 0)
            })
            .unwrap();

        assert!(matches!(
            cluster.check_replication(&replicas, None).await,
            Err(CollaboratorError::Ineligible { .. })
        ));
    }

    #[tokio::test]
    async fn test_master_elect_must_be_reachable() {
        let cluster = cluster();
        cluster
            .store()
            .update_tablet(&path("zone1-101"), |t| t.health = TabletHealth::Unreachable)
            .unwrap();

        let candidate = cluster.store().tablet(&path("zone1-101")).unwrap();
        assert_eq!(
            cluster.check_master_elect(&candidate).await,
            Err(CollaboratorError::Unreachable(path("zone1-101")))
        );
    }

    #[tokio::test]
    async fn test_consistency_requires_shared_epoch() {
        let cluster = cluster();
        let replicas = cluster.store().replica_set(&shard()).unwrap();
        assert!(cluster.check_consistency(&replicas).await.is_ok());

        cluster
            .store()
            .update_tablet(&path("zone1-102"), |t| {
                t.position = ReplicationPosition::new(3, 1200)
            })
            .unwrap();
        let replicas = cluster.store().replica_set(&shard()).unwrap();
        assert!(matches!(
            cluster.check_consistency(&replicas).await,
            Err(CollaboratorError::Inconsistent(_))
        ));
    }

    #[tokio::test]
    async fn test_promote_opens_new_epoch() {
        let cluster = cluster();
        let candidate = cluster.store().tablet(&path("zone1-101")).unwrap();

        let master = cluster.promote(&candidate).await.unwrap();

        assert_eq!(master.position, ReplicationPosition::new(5, 0));
        assert_eq!(master.address, "zone1-101.db:3306");
        let stored = cluster.store().tablet(&path("zone1-101")).unwrap();
        assert_eq!(stored.role, TabletRole::Master);
        assert_eq!(stored.parent, None);
    }

    #[tokio::test]
    async fn test_promote_refuses_exhausted_epoch() {
        let cluster = cluster();
        let candidate = cluster
            .store()
            .update_tablet(&path("zone1-101"), |t| {
                t.position = ReplicationPosition::new(u64::MAX, 5)
            })
            .unwrap();

        let err = cluster.promote(&candidate).await.unwrap_err();

        assert!(matches!(err, CollaboratorError::Ineligible { .. }));
        let stored = cluster.store().tablet(&path("zone1-101")).unwrap();
        assert_eq!(stored.role, TabletRole::Replica);
        assert_eq!(stored.position, ReplicationPosition::new(u64::MAX, 5));
    }

    #[tokio::test]
    async fn test_store_writes_yield_to_the_runtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = TopologyStore::create(
            dir.path().join("topology.json"),
            cluster().store().snapshot(),
        )
        .unwrap();
        let cluster = LocalCluster::new(Arc::new(store));
        let replica = cluster.store().tablet(&path("zone1-102")).unwrap();
        let master = MasterDescriptor {
            path: path("zone1-101"),
            shard: shard(),
            address: "zone1-101.db:3306".to_string(),
            position: ReplicationPosition::new(5, 0),
        };

        let mut restart = cluster.restart_replica(&replica, &master);
        assert!(futures::poll!(restart.as_mut()).is_pending());
        restart.await.unwrap();

        assert_eq!(
            cluster.store().tablet(&path("zone1-102")).unwrap().parent,
            Some(path("zone1-101"))
        );
    }

    #[tokio::test]
    async fn test_restart_repoints_replica() {
        let cluster = cluster();
        let candidate = cluster.store().tablet(&path("zone1-101")).unwrap();
        let master = cluster.promote(&candidate).await.unwrap();
        let replica = cluster.store().tablet(&path("zone1-102")).unwrap();

        cluster.restart_replica(&replica, &master).await.unwrap();

        let stored = cluster.store().tablet(&path("zone1-102")).unwrap();
        assert_eq!(stored.parent, Some(path("zone1-101")));
        assert_eq!(stored.position, master.position);
    }

    #[tokio::test]
    async fn test_scrap_refuses_healthy_master_without_force() {
        let cluster = cluster();
        cluster
            .store()
            .update_tablet(&path("zone1-100"), |t| t.health = TabletHealth::Healthy)
            .unwrap();

        assert!(cluster.scrap(&path("zone1-100"), false).await.is_err());
        cluster.scrap(&path("zone1-100"), true).await.unwrap();
        assert_eq!(
            cluster.store().tablet(&path("zone1-100")).unwrap().role,
            TabletRole::Scrap
        );
    }

    #[tokio::test]
    async fn test_finish_reparent_writes_shard_record() {
        let cluster = cluster();
        let candidate = cluster.store().tablet(&path("zone1-101")).unwrap();

        cluster
            .finish_reparent(&candidate, false, true)
            .await
            .unwrap();

        let record = cluster.store().shard_entry(&shard()).unwrap().record;
        assert_eq!(record.master, Some(path("zone1-101")));
        assert_eq!(record.majority_restart, Some(false));
        assert!(record.master_read_only);
        assert!(record.reparented_at.is_some());
    }

    #[test]
    fn test_build_request_from_store() {
        let cluster = cluster();

        let request = cluster
            .build_request(&shard(), &path("zone1-102"), false, false)
            .unwrap();

        assert_eq!(request.failed_master.path, path("zone1-100"));
        assert_eq!(request.replica_set.describe_paths(), "[zone1-101, zone1-102]");
        assert!(request.validate().is_ok());
    }
}
