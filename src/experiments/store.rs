//! Durable experiment record store
//!
//! Records live in a concurrent map and are mirrored to a single JSON
//! array file after every mutation. Writes go through a temp file plus
//! rename so the file on disk is always a complete snapshot, and a
//! persistence mutex keeps snapshots ordered. If a write fails the
//! in-memory mutation stands and the caller gets a typed error.
//!
//! Multi-step updates use [`RecordStore::take`]: the record is removed
//! from the map, mutated locally, and either committed or — on any other
//! exit path, early return and panic included — restored by the guard's
//! `Drop`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::error::StoreError;
use super::record::{ExperimentKind, ExperimentRecord};

/// File name of the persisted record set, inside the store's base
/// directory
pub const RECORDS_FILE: &str = "experiments.json";

/// Thread-safe store of experiment records with file-backed persistence
pub struct RecordStore {
    records: DashMap<Uuid, ExperimentRecord>,
    base_dir: PathBuf,
    persist_lock: Mutex<()>,
}

impl RecordStore {
    /// Open a store rooted at `base_dir`, loading the record file if one
    /// exists
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        let store = Self {
            records: DashMap::new(),
            base_dir,
            persist_lock: Mutex::new(()),
        };

        let path = store.records_file();
        if path.exists() {
            let contents = fs::read(&path).map_err(StoreError::Load)?;
            let records: Vec<ExperimentRecord> =
                serde_json::from_slice(&contents).map_err(StoreError::Corrupt)?;

            tracing::debug!(
                path = %path.display(),
                count = records.len(),
                "Loaded experiment records"
            );
            for record in records {
                store.records.insert(record.id, record);
            }
        }

        Ok(store)
    }

    /// Directory that holds the record file and the per-experiment
    /// working directories
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the persisted record file
    pub fn records_file(&self) -> PathBuf {
        self.base_dir.join(RECORDS_FILE)
    }

    /// Snapshot of all records, oldest registration first
    pub fn load_all(&self) -> Vec<ExperimentRecord> {
        let mut records: Vec<ExperimentRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| (r.register_time, r.id));
        records
    }

    /// Look up one record
    pub fn get(&self, id: Uuid) -> Option<ExperimentRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Whether a nickname is used by any record other than `excluding`
    pub fn nickname_in_use(&self, nickname: &str, excluding: Option<Uuid>) -> bool {
        self.records.iter().any(|r| {
            r.value().experiment.nickname == nickname && Some(r.value().id) != excluding
        })
    }

    /// Insert or replace a record and persist
    pub fn put(&self, record: ExperimentRecord) -> Result<(), StoreError> {
        self.records.insert(record.id, record);
        self.persist()
    }

    /// Atomically remove a record for a multi-step update
    ///
    /// The returned guard restores the original record when dropped;
    /// call [`RecordGuard::commit`] with the updated record to keep the
    /// change instead.
    pub fn take(&self, id: Uuid) -> Option<RecordGuard<'_>> {
        let (_, record) = self.records.remove(&id)?;
        if let Err(e) = self.persist() {
            tracing::error!(id = %id, error = %e, "Failed to persist record removal");
        }

        Some(RecordGuard {
            store: self,
            original: record,
            committed: false,
        })
    }

    /// Remove a record, deleting its working directory unless it is a
    /// local experiment
    pub fn delete(&self, id: Uuid) -> Result<Option<ExperimentRecord>, StoreError> {
        let Some((_, record)) = self.records.remove(&id) else {
            return Ok(None);
        };

        self.remove_working_dir(&record);
        self.persist()?;
        Ok(Some(record))
    }

    /// Remove every record and its non-local working directory
    pub fn clear(&self) -> Result<(), StoreError> {
        for entry in self.records.iter() {
            self.remove_working_dir(entry.value());
        }
        self.records.clear();
        self.persist()
    }

    /// Write the full record set to disk as a pretty-printed JSON array
    fn persist(&self) -> Result<(), StoreError> {
        let _ordered = self.persist_lock.lock();

        let records = self.load_all();
        let contents = serde_json::to_vec_pretty(&records)
            .map_err(|e| StoreError::Persist(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        fs::create_dir_all(&self.base_dir).map_err(StoreError::Persist)?;
        let mut file =
            tempfile::NamedTempFile::new_in(&self.base_dir).map_err(StoreError::Persist)?;
        file.write_all(&contents).map_err(StoreError::Persist)?;
        file.persist(self.records_file())
            .map_err(|e| StoreError::Persist(e.error))?;

        Ok(())
    }

    /// Local experiments reference files outside our tree and are left
    /// alone; everything else lives under the base directory and goes
    /// with its record.
    fn remove_working_dir(&self, record: &ExperimentRecord) {
        if record.experiment.kind == ExperimentKind::Local {
            return;
        }

        let dir = self.base_dir.join(&record.experiment.nickname);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(path = %dir.display(), "Removed experiment working directory");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to remove experiment working directory"
                );
            }
        }
    }
}

/// Restores a taken record unless the update is committed
pub struct RecordGuard<'a> {
    store: &'a RecordStore,
    original: ExperimentRecord,
    committed: bool,
}

impl RecordGuard<'_> {
    /// The record as it was when taken
    pub fn record(&self) -> &ExperimentRecord {
        &self.original
    }

    /// Clone of the taken record, for mutating locally
    pub fn to_record(&self) -> ExperimentRecord {
        self.original.clone()
    }

    /// Store the updated record and persist, discarding the original
    pub fn commit(mut self, updated: ExperimentRecord) -> Result<(), StoreError> {
        self.committed = true;
        self.store.put(updated)
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let id = self.original.id;
        self.store.records.insert(id, self.original.clone());
        if let Err(e) = self.store.persist() {
            tracing::error!(id = %id, error = %e, "Failed to persist record restore");
        }
    }
}
