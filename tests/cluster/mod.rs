//! Shared fixtures for reparent integration tests
//!
//! Builds a file-backed topology for shard `commerce/0`:
//! - zone1-100: master, failed
//! - zone1-101, zone1-102, zone1-103: replicas of zone1-100 at epoch 3

use std::path::PathBuf;
use std::sync::Arc;

use shardwrangler::reparent::{ReparentConfig, ReparentCoordinator};
use shardwrangler::topology::{
    LocalCluster, ReplicationPosition, ShardPath, Tablet, TabletHealth, TabletPath, TabletRole,
    TopologyDocument, TopologyStore,
};
use tempfile::TempDir;

pub const SHARD: &str = "commerce/0";
pub const FAILED_MASTER: &str = "zone1-100";
pub const REPLICAS: [&str; 3] = ["zone1-101", "zone1-102", "zone1-103"];

pub fn shard() -> ShardPath {
    ShardPath::parse(SHARD).unwrap()
}

pub fn path(raw: &str) -> TabletPath {
    TabletPath::parse(raw).unwrap()
}

pub fn tablet(raw: &str, role: TabletRole) -> Tablet {
    Tablet::new(path(raw), shard(), role)
        .with_address(format!("{}.commerce.internal:3306", raw))
        .with_position(ReplicationPosition::new(3, 1_000))
}

/// Fixture owning the temp dir for as long as the test runs.
pub struct TestCluster {
    pub dir: TempDir,
    pub cluster: Arc<LocalCluster>,
}

impl TestCluster {
    pub fn new() -> Self {
        Self::with(|document| document)
    }

    /// Build the standard topology, letting the test adjust it first.
    pub fn with<F>(adjust: F) -> Self
    where
        F: FnOnce(TopologyDocument) -> TopologyDocument,
    {
        let mut document = TopologyDocument::new()
            .with_tablet(tablet(FAILED_MASTER, TabletRole::Master).with_health(TabletHealth::Failed))
            .unwrap();
        for replica in REPLICAS {
            document
                .add_tablet(tablet(replica, TabletRole::Replica).with_parent(path(FAILED_MASTER)))
                .unwrap();
        }
        let document = adjust(document);

        let dir = TempDir::new().unwrap();
        let store = TopologyStore::create(dir.path().join("topology.json"), document).unwrap();
        let cluster = Arc::new(LocalCluster::new(Arc::new(store)));
        Self { dir, cluster }
    }

    pub fn topology_file(&self) -> PathBuf {
        self.dir.path().join("topology.json")
    }

    pub fn coordinator(&self) -> ReparentCoordinator {
        let config = ReparentConfig::default();
        ReparentCoordinator::new(self.cluster.collaborators(&config), config)
    }

    pub fn set_health(&self, raw: &str, health: TabletHealth) {
        self.cluster
            .store()
            .update_tablet(&path(raw), |t| t.health = health)
            .unwrap();
    }

    /// Reopen the topology file from disk.
    pub fn reopen(&self) -> TopologyStore {
        TopologyStore::open(self.topology_file()).unwrap()
    }
}
