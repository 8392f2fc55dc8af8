//! Entitlement Storage
//!
//! The system of record for entitlements. Every component reads or writes
//! through this trait; nothing talks to anything else directly.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use crush_core::{EntitlementId, EntitlementRecord, OwnerId};

use crate::error::{PaymentError, Result};

/// Outcome of the paid transition
#[derive(Clone, Debug)]
pub enum MarkPaid {
    /// This call flipped `paid` from false to true
    Transitioned(Box<EntitlementRecord>),

    /// Already paid; nothing changed
    AlreadyPaid,

    /// No record with that id
    NotFound,
}

/// Entitlement storage trait
pub trait EntitlementStore: Send + Sync {
    /// Insert a new record. Fails if the id is taken.
    fn insert(&self, record: &EntitlementRecord) -> Result<()>;

    /// Get a record by id, paid or not
    fn get(&self, id: &EntitlementId) -> Result<Option<EntitlementRecord>>;

    /// Get a record by id only if it is paid
    fn get_paid(&self, id: &EntitlementId) -> Result<Option<EntitlementRecord>> {
        Ok(self.get(id)?.filter(EntitlementRecord::is_paid))
    }

    /// Conditional `set paid = true where id = ? and paid = false`
    fn mark_paid(&self, id: &EntitlementId, at: DateTime<Utc>) -> Result<MarkPaid>;

    /// All records of one owner, newest first
    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<EntitlementRecord>>;
}

type RecordMap = HashMap<EntitlementId, EntitlementRecord>;

fn read_lock(lock: &RwLock<RecordMap>) -> Result<RwLockReadGuard<'_, RecordMap>> {
    lock.read()
        .map_err(|_| PaymentError::Storage("entitlement store lock poisoned".into()))
}

fn write_lock(lock: &RwLock<RecordMap>) -> Result<RwLockWriteGuard<'_, RecordMap>> {
    lock.write()
        .map_err(|_| PaymentError::Storage("entitlement store lock poisoned".into()))
}

fn insert_into(records: &mut RecordMap, record: &EntitlementRecord) -> Result<()> {
    if records.contains_key(&record.id) {
        return Err(PaymentError::Storage(format!(
            "entitlement {} already exists",
            record.id
        )));
    }
    records.insert(record.id.clone(), record.clone());
    Ok(())
}

fn mark_paid_in(records: &mut RecordMap, id: &EntitlementId, at: DateTime<Utc>) -> MarkPaid {
    match records.get_mut(id) {
        Some(record) => {
            if record.mark_paid(at) {
                MarkPaid::Transitioned(Box::new(record.clone()))
            } else {
                MarkPaid::AlreadyPaid
            }
        }
        None => MarkPaid::NotFound,
    }
}

fn owned_by(records: &RecordMap, owner: &OwnerId) -> Vec<EntitlementRecord> {
    let mut owned: Vec<_> = records
        .values()
        .filter(|r| &r.owner_id == owner)
        .cloned()
        .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

/// In-memory entitlement store (for development and tests)
pub struct MemoryEntitlementStore {
    records: RwLock<RecordMap>,
}

impl Default for MemoryEntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl EntitlementStore for MemoryEntitlementStore {
    fn insert(&self, record: &EntitlementRecord) -> Result<()> {
        let mut guard = write_lock(&self.records)?;
        insert_into(&mut guard, record)
    }

    fn get(&self, id: &EntitlementId) -> Result<Option<EntitlementRecord>> {
        let guard = read_lock(&self.records)?;
        Ok(guard.get(id).cloned())
    }

    fn mark_paid(&self, id: &EntitlementId, at: DateTime<Utc>) -> Result<MarkPaid> {
        let mut guard = write_lock(&self.records)?;
        Ok(mark_paid_in(&mut guard, id, at))
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<EntitlementRecord>> {
        let guard = read_lock(&self.records)?;
        Ok(owned_by(&guard, owner))
    }
}

/// JSON-file entitlement store
///
/// Keeps the working set in memory and rewrites the whole snapshot on every
/// write (temp file in the same directory, then rename). A write only
/// becomes visible once the snapshot is on disk.
pub struct FileEntitlementStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
}

impl FileEntitlementStore {
    /// Open (or start) a store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| PaymentError::Storage(format!("read {}: {e}", path.display())))?;
            let list: Vec<EntitlementRecord> = serde_json::from_slice(&raw)
                .map_err(|e| PaymentError::Storage(format!("parse {}: {e}", path.display())))?;
            if let Some(bad) = list.iter().find(|r| !r.kind_matches_payload()) {
                return Err(PaymentError::Storage(format!(
                    "parse {}: entitlement {} is a {} but carries a {} payload",
                    path.display(),
                    bad.id,
                    bad.artifact_kind,
                    bad.payload.kind()
                )));
            }
            list.into_iter().map(|r| (r.id.clone(), r)).collect()
        } else {
            HashMap::new()
        };

        tracing::info!(path = %path.display(), records = records.len(), "Opened entitlement store");

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &RecordMap) -> Result<()> {
        let mut list: Vec<&EntitlementRecord> = records.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| PaymentError::Storage(format!("serialize snapshot: {e}")))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let storage_err = |e: std::io::Error| {
            PaymentError::Storage(format!("write {}: {e}", self.path.display()))
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage_err)?;
        tmp.write_all(&bytes).map_err(storage_err)?;
        tmp.as_file().sync_all().map_err(storage_err)?;
        tmp.persist(&self.path).map_err(|e| storage_err(e.error))?;
        Ok(())
    }
}

impl EntitlementStore for FileEntitlementStore {
    fn insert(&self, record: &EntitlementRecord) -> Result<()> {
        let mut guard = write_lock(&self.records)?;
        let mut next = guard.clone();
        insert_into(&mut next, record)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn get(&self, id: &EntitlementId) -> Result<Option<EntitlementRecord>> {
        let guard = read_lock(&self.records)?;
        Ok(guard.get(id).cloned())
    }

    fn mark_paid(&self, id: &EntitlementId, at: DateTime<Utc>) -> Result<MarkPaid> {
        let mut guard = write_lock(&self.records)?;
        let mut next = guard.clone();
        let outcome = mark_paid_in(&mut next, id, at);
        if matches!(outcome, MarkPaid::Transitioned(_)) {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(outcome)
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<EntitlementRecord>> {
        let guard = read_lock(&self.records)?;
        Ok(owned_by(&guard, owner))
    }
}
