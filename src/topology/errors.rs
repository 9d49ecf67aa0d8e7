//! Topology Error Types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::tablet::{ShardPath, TabletPath};

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised by the topology types and the metadata store
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Tablet path does not match `<cell>-<uid>`
    #[error("invalid tablet path '{0}'")]
    InvalidTabletPath(String),

    /// Shard path does not match `<keyspace>/<shard>`
    #[error("invalid shard path '{0}'")]
    InvalidShardPath(String),

    #[error("shard {0} not found")]
    ShardNotFound(ShardPath),

    #[error("tablet {0} not found")]
    TabletNotFound(TabletPath),

    /// Shard has no recorded master
    #[error("shard {0} has no master")]
    NoMaster(ShardPath),

    /// Tablet already registered
    #[error("tablet {0} already exists")]
    DuplicateTablet(TabletPath),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Topology file could not be parsed or serialized
    #[error("malformed topology file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Stored checksum does not match the document
    #[error("checksum mismatch in {path}: stored {stored}, computed {computed}")]
    ChecksumMismatch {
        path: PathBuf,
        stored: String,
        computed: String,
    },
}

impl TopologyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the stored file itself is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::ChecksumMismatch { .. })
    }
}
