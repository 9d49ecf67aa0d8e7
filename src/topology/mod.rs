//! Cluster Topology
//!
//! Tablets, shards and the metadata store that records who is master of
//! each shard. `LocalCluster` drives reparents against that store.

mod checksum;
mod errors;
mod local;
mod replica_set;
mod store;
mod tablet;

pub use errors::{TopologyError, TopologyResult};
pub use local::LocalCluster;
pub use replica_set::ReplicaSet;
pub use store::{ShardEntry, ShardRecord, TopologyDocument, TopologyStore};
pub use tablet::{ReplicationPosition, ShardPath, Tablet, TabletHealth, TabletPath, TabletRole};
