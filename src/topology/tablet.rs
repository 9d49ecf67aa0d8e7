//! Tablet identity and replication metadata
//!
//! A tablet is one database replica process. Everything here is a
//! read-only snapshot of what the metadata store last recorded; none of
//! it is refreshed behind the caller's back.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{TopologyError, TopologyResult};

fn tablet_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*-[0-9]+$").expect("tablet path pattern is valid")
    })
}

fn shard_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+/[A-Za-z0-9_-]+$").expect("shard path pattern is valid")
    })
}

/// Unique tablet identifier, `<cell>-<uid>` (e.g. `zone1-0000000100`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TabletPath(String);

impl TabletPath {
    /// Parse and validate a tablet path.
    pub fn parse(raw: &str) -> TopologyResult<Self> {
        if tablet_path_pattern().is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TopologyError::InvalidTabletPath(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TabletPath {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TabletPath> for String {
    fn from(path: TabletPath) -> Self {
        path.0
    }
}

impl fmt::Display for TabletPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shard identifier, `<keyspace>/<shard>` (e.g. `commerce/-80`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShardPath(String);

impl ShardPath {
    /// Parse and validate a shard path.
    pub fn parse(raw: &str) -> TopologyResult<Self> {
        if shard_path_pattern().is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TopologyError::InvalidShardPath(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ShardPath {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShardPath> for String {
    fn from(path: ShardPath) -> Self {
        path.0
    }
}

impl fmt::Display for ShardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a tablet plays in its shard's replication graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletRole {
    /// Sole write authority for the shard
    Master,
    /// Serving replica following the master
    Replica,
    /// Idle replica, follows the master but does not serve
    Spare,
    /// Permanently removed from service
    Scrap,
}

impl TabletRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Replica => "replica",
            Self::Spare => "spare",
            Self::Scrap => "scrap",
        }
    }

    /// Whether a tablet in this role takes a master pointer.
    pub fn follows_master(&self) -> bool {
        matches!(self, Self::Replica | Self::Spare)
    }
}

impl fmt::Display for TabletRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last health the metadata store recorded for a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletHealth {
    #[default]
    Healthy,
    /// Did not answer the last health check
    Unreachable,
    /// Reported a replication failure
    Failed,
}

impl TabletHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unreachable => "unreachable",
            Self::Failed => "failed",
        }
    }
}

/// Replication position.
///
/// `epoch` identifies the replication history (it changes whenever a new
/// master starts writing); `offset` is the progress within that history.
/// Positions from different epochs are ordered by epoch first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ReplicationPosition {
    pub epoch: u64,
    pub offset: u64,
}

impl ReplicationPosition {
    pub fn new(epoch: u64, offset: u64) -> Self {
        Self { epoch, offset }
    }

    /// Same history and at least as far along as `other`.
    pub fn is_caught_up_to(&self, other: &ReplicationPosition) -> bool {
        self.epoch == other.epoch && self.offset >= other.offset
    }

    /// Whether both positions belong to the same replication history.
    pub fn shares_history_with(&self, other: &ReplicationPosition) -> bool {
        self.epoch == other.epoch
    }
}

impl fmt::Display for ReplicationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch, self.offset)
    }
}

/// Snapshot of one tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tablet {
    pub path: TabletPath,
    pub shard: ShardPath,
    pub role: TabletRole,

    #[serde(default)]
    pub position: ReplicationPosition,

    /// Master this tablet currently replicates from.
    #[serde(default)]
    pub parent: Option<TabletPath>,

    /// `host:port` other tablets use to replicate from this one.
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub health: TabletHealth,
}

impl Tablet {
    /// Create a healthy tablet at position zero with no parent.
    pub fn new(path: TabletPath, shard: ShardPath, role: TabletRole) -> Self {
        Self {
            path,
            shard,
            role,
            position: ReplicationPosition::default(),
            parent: None,
            address: String::new(),
            health: TabletHealth::Healthy,
        }
    }

    pub fn with_position(mut self, position: ReplicationPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_parent(mut self, parent: TabletPath) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_health(mut self, health: TabletHealth) -> Self {
        self.health = health;
        self
    }

    /// Able to accept a new master pointer.
    ///
    /// Unreachable and failed tablets are excluded, as are tablets whose
    /// role never follows a master.
    pub fn is_restartable(&self) -> bool {
        self.role.follows_master() && self.health == TabletHealth::Healthy
    }
}
