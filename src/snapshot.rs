// src/snapshot.rs
//! # Snapshot
//! The whole display state of one refresh cycle, published atomically and
//! persisted as one versioned JSON blob.
//!
//! Load policy: a missing, unreadable or mismatched-version blob means cold
//! start. Nothing here is ever fatal to the service.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::change::ChangeMode;
use crate::composite::CompositeIndex;
use crate::digest::client::MirrorState;
use crate::error::PersistenceError;
use crate::history::HistorySet;
use crate::staleness::FieldKind;

/// Bump when the blob layout changes; older blobs are then discarded.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub last_observed_at: Option<i64>,
    #[serde(default)]
    pub series: Vec<f64>,
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub change_mode: ChangeMode,
    /// Display label for `change_mode`, e.g. "24h".
    #[serde(default)]
    pub change_label: String,
    #[serde(default)]
    pub stale: bool,
    /// Value came from this cycle's upstream data.
    #[serde(default)]
    pub live: bool,
    /// Winning candidate name.
    #[serde(default)]
    pub source: Option<String>,
    /// User-facing provenance of the value.
    #[serde(default)]
    pub provenance: Option<String>,
    #[serde(default)]
    pub series_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    /// `None` until the first cycle completes.
    pub generated_at: Option<i64>,
    #[serde(default)]
    pub cycle: u64,
    #[serde(default)]
    pub fields: BTreeMap<String, ResolvedField>,
    #[serde(default)]
    pub history: HistorySet,
    #[serde(default)]
    pub indices: BTreeMap<String, CompositeIndex>,
    #[serde(default)]
    pub digest: MirrorState,
    #[serde(default)]
    pub source_updated_at: Option<String>,
    /// The single user-visible error line, if any.
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: None,
            cycle: 0,
            fields: BTreeMap::new(),
            history: HistorySet::new(),
            indices: BTreeMap::new(),
            digest: MirrorState::default(),
            source_updated_at: None,
            error: None,
        }
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn field(&self, key: &str) -> Option<&ResolvedField> {
        self.fields.get(key)
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|f| f.value)
    }

    pub fn live_count(&self) -> usize {
        self.fields.values().filter(|f| f.live).count()
    }

    pub fn stale_count(&self) -> usize {
        self.fields.values().filter(|f| f.stale).count()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(self).map_err(PersistenceError::Encode)
    }

    /// Strict decode: the version is checked before the body is trusted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        #[derive(Deserialize)]
        struct VersionOnly {
            #[serde(default)]
            schema_version: u32,
        }
        let head: VersionOnly = serde_json::from_slice(bytes).map_err(PersistenceError::Decode)?;
        if head.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::Version {
                found: head.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        serde_json::from_slice(bytes).map_err(PersistenceError::Decode)
    }
}

/// Opaque single-key byte storage.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError>;
}

/// One `<key>.json` file per key; writes go through a temp file + rename.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::Io(io::Error::other("memory store lock poisoned"))
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let blobs = self.blobs.lock().map_err(|_| poisoned())?;
        Ok(blobs.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        let mut blobs = self.blobs.lock().map_err(|_| poisoned())?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Save/load of the snapshot under one key.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let bytes = snapshot.to_bytes()?;
        self.store.set(&self.key, &bytes)?;
        debug!(target: "snapshot", key = %self.key, bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    /// Save, logging and counting failures instead of returning them.
    pub fn save_logged(&self, snapshot: &Snapshot) {
        if let Err(e) = self.save(snapshot) {
            counter!("snapshot_write_errors_total").increment(1);
            warn!(target: "snapshot", key = %self.key, error = %e, "snapshot write failed");
        }
    }

    pub fn try_load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        match self.store.get(&self.key)? {
            Some(bytes) => Snapshot::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Warm start when possible, cold start otherwise.
    pub fn load(&self) -> Option<Snapshot> {
        match self.try_load() {
            Ok(Some(s)) => {
                info!(
                    target: "snapshot",
                    key = %self.key,
                    fields = s.fields.len(),
                    cycle = s.cycle,
                    "restored snapshot"
                );
                Some(s)
            }
            Ok(None) => {
                info!(target: "snapshot", key = %self.key, "no snapshot; cold start");
                None
            }
            Err(e) => {
                info!(target: "snapshot", key = %self.key, error = %e, "discarding snapshot; cold start");
                None
            }
        }
    }
}

/// The currently published snapshot. Readers get a whole `Arc<Snapshot>`;
/// the refresh task replaces it in one store.
pub struct SnapshotHandle {
    current: ArcSwap<Snapshot>,
}

impl SnapshotHandle {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, next: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        next
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}
