//! shardwrangler - shard master failover
//!
//! Replaces a dead shard master with one of its replicas, redirects the
//! rest of the shard to it, and records the new topology.

pub mod cli;
pub mod observability;
pub mod reparent;
pub mod topology;
