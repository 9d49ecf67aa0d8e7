//! Topology Store
//!
//! JSON-file-backed cluster metadata: shards, their tablets, and the
//! per-shard record of who is master.
//!
//! Writes are all-or-nothing:
//! 1. Apply the change to a copy of the document
//! 2. Write the copy to a temp file and fsync it
//! 3. Rename temp to final (atomic on POSIX)
//! 4. Swap the in-memory document
//!
//! A failed write leaves both the file and the in-memory view unchanged.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checksum::{compute_checksum, format_checksum, parse_checksum};
use super::errors::{TopologyError, TopologyResult};
use super::replica_set::ReplicaSet;
use super::tablet::{ShardPath, Tablet, TabletPath, TabletRole};

/// Durable per-shard record of the current master.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    #[serde(default)]
    pub master: Option<TabletPath>,

    /// Whether the master was left read-only after the last reparent.
    #[serde(default)]
    pub master_read_only: bool,

    /// Majority outcome of the last reparent's replica redirect.
    #[serde(default)]
    pub majority_restart: Option<bool>,

    #[serde(default)]
    pub reparented_at: Option<DateTime<Utc>>,
}

/// One shard: its record and every tablet registered to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    #[serde(default)]
    pub record: ShardRecord,

    #[serde(default)]
    pub tablets: BTreeMap<TabletPath, Tablet>,
}

/// The whole cluster topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub shards: BTreeMap<ShardPath, ShardEntry>,
}

impl TopologyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tablet under its shard.
    ///
    /// The first master-role tablet of a shard becomes the recorded master.
    pub fn add_tablet(&mut self, tablet: Tablet) -> TopologyResult<()> {
        if self.find_tablet(&tablet.path).is_some() {
            return Err(TopologyError::DuplicateTablet(tablet.path));
        }

        let entry = self.shards.entry(tablet.shard.clone()).or_default();
        if tablet.role == TabletRole::Master && entry.record.master.is_none() {
            entry.record.master = Some(tablet.path.clone());
        }
        entry.tablets.insert(tablet.path.clone(), tablet);
        Ok(())
    }

    /// Builder form of [`add_tablet`](Self::add_tablet).
    pub fn with_tablet(mut self, tablet: Tablet) -> TopologyResult<Self> {
        self.add_tablet(tablet)?;
        Ok(self)
    }

    pub fn shard(&self, shard: &ShardPath) -> TopologyResult<&ShardEntry> {
        self.shards
            .get(shard)
            .ok_or_else(|| TopologyError::ShardNotFound(shard.clone()))
    }

    pub fn find_tablet(&self, path: &TabletPath) -> Option<&Tablet> {
        self.shards
            .values()
            .find_map(|entry| entry.tablets.get(path))
    }

    fn find_tablet_mut(&mut self, path: &TabletPath) -> Option<&mut Tablet> {
        self.shards
            .values_mut()
            .find_map(|entry| entry.tablets.get_mut(path))
    }
}

/// On-disk envelope. `checksum` is optional so hand-written files load.
#[derive(Serialize, Deserialize)]
struct TopologyFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    topology: TopologyDocument,
}

fn document_checksum(document: &TopologyDocument, path: &Path) -> TopologyResult<u32> {
    let canonical = serde_json::to_vec(document)
        .map_err(|e| TopologyError::malformed(path, format!("failed to serialize: {}", e)))?;
    Ok(compute_checksum(&canonical))
}

/// Shared metadata store.
///
/// Without a backing path the store is memory-only; everything else
/// behaves the same.
#[derive(Debug)]
pub struct TopologyStore {
    path: Option<PathBuf>,
    document: RwLock<TopologyDocument>,
}

impl TopologyStore {
    /// Memory-only store.
    pub fn in_memory(document: TopologyDocument) -> Self {
        Self {
            path: None,
            document: RwLock::new(document),
        }
    }

    /// Create a file-backed store, writing `document` to `path`.
    pub fn create(path: impl Into<PathBuf>, document: TopologyDocument) -> TopologyResult<Self> {
        let path = path.into();
        write_atomic(&path, &document)?;
        Ok(Self {
            path: Some(path),
            document: RwLock::new(document),
        })
    }

    /// Open an existing topology file, verifying its checksum if present.
    pub fn open(path: impl Into<PathBuf>) -> TopologyResult<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| TopologyError::io(&path, e))?;

        let file: TopologyFile = serde_json::from_str(&content)
            .map_err(|e| TopologyError::malformed(&path, e.to_string()))?;

        if let Some(stored) = &file.checksum {
            let expected = parse_checksum(stored).ok_or_else(|| {
                TopologyError::malformed(&path, format!("unreadable checksum '{}'", stored))
            })?;
            let computed = document_checksum(&file.topology, &path)?;
            if expected != computed {
                return Err(TopologyError::ChecksumMismatch {
                    path,
                    stored: stored.clone(),
                    computed: format_checksum(computed),
                });
            }
        }

        Ok(Self {
            path: Some(path),
            document: RwLock::new(file.topology),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the full document.
    pub fn snapshot(&self) -> TopologyDocument {
        self.read().clone()
    }

    pub fn shard_entry(&self, shard: &ShardPath) -> TopologyResult<ShardEntry> {
        self.read().shard(shard).cloned()
    }

    pub fn tablet(&self, path: &TabletPath) -> TopologyResult<Tablet> {
        self.read()
            .find_tablet(path)
            .cloned()
            .ok_or_else(|| TopologyError::TabletNotFound(path.clone()))
    }

    /// Tablet recorded as the shard's master.
    pub fn master(&self, shard: &ShardPath) -> TopologyResult<Tablet> {
        let document = self.read();
        let entry = document.shard(shard)?;
        let master = entry
            .record
            .master
            .as_ref()
            .ok_or_else(|| TopologyError::NoMaster(shard.clone()))?;
        entry
            .tablets
            .get(master)
            .cloned()
            .ok_or_else(|| TopologyError::TabletNotFound(master.clone()))
    }

    /// Snapshot of the shard's replicas: every tablet except the recorded
    /// master and scrapped tablets.
    pub fn replica_set(&self, shard: &ShardPath) -> TopologyResult<ReplicaSet> {
        let document = self.read();
        let entry = document.shard(shard)?;
        let master = entry.record.master.as_ref();

        Ok(entry
            .tablets
            .values()
            .filter(|tablet| Some(&tablet.path) != master)
            .filter(|tablet| !matches!(tablet.role, TabletRole::Master | TabletRole::Scrap))
            .cloned()
            .collect())
    }

    /// Apply `update` to one tablet and persist. Returns the updated tablet.
    pub fn update_tablet<F>(&self, path: &TabletPath, update: F) -> TopologyResult<Tablet>
    where
        F: FnOnce(&mut Tablet),
    {
        self.mutate(|document| {
            let tablet = document
                .find_tablet_mut(path)
                .ok_or_else(|| TopologyError::TabletNotFound(path.clone()))?;
            update(tablet);
            Ok(tablet.clone())
        })
    }

    /// Apply `update` to a shard record and persist. Returns the new record.
    pub fn update_shard_record<F>(&self, shard: &ShardPath, update: F) -> TopologyResult<ShardRecord>
    where
        F: FnOnce(&mut ShardRecord),
    {
        self.mutate(|document| {
            let entry = document
                .shards
                .get_mut(shard)
                .ok_or_else(|| TopologyError::ShardNotFound(shard.clone()))?;
            update(&mut entry.record);
            Ok(entry.record.clone())
        })
    }

    fn mutate<T, F>(&self, change: F) -> TopologyResult<T>
    where
        F: FnOnce(&mut TopologyDocument) -> TopologyResult<T>,
    {
        let mut guard = self
            .document
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut next = guard.clone();
        let result = change(&mut next)?;

        if let Some(path) = &self.path {
            write_atomic(path, &next)?;
        }

        *guard = next;
        Ok(result)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TopologyDocument> {
        self.document
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write the document to `path` via temp file, fsync and rename.
fn write_atomic(path: &Path, document: &TopologyDocument) -> TopologyResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| TopologyError::io(parent, e))?;
        }
    }

    let checksum = document_checksum(document, path)?;
    let envelope = TopologyFile {
        checksum: Some(format_checksum(checksum)),
        topology: document.clone(),
    };
    let content = serde_json::to_string_pretty(&envelope)
        .map_err(|e| TopologyError::malformed(path, format!("failed to serialize: {}", e)))?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| TopologyError::io(&temp_path, e))?;

    file.write_all(content.as_bytes())
        .map_err(|e| TopologyError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| TopologyError::io(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| TopologyError::io(path, e))?;

    // Make the rename itself durable
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}
