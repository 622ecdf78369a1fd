mod persister;
mod records;

#[cfg(test)]
mod tests;

use std::{
    collections::BTreeSet,
    path::Path,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::{
    error::{Error, Result, OK},
    hash::FileId,
    message::ChunkKey,
    peer::PeerId,
    persist,
};

use self::persister::Persister;

pub use self::records::{
    ChunkRecord, ChunkReplicas, FileRecord, ReassemblyBuffer, RestoreStatus, Tombstone,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    files: Vec<FileRecord>,
    chunks: Vec<ChunkRecord>,
    tombstones: Vec<Tombstone>,
    deleted: Vec<(FileId, DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct Tables {
    files: DashMap<FileId, FileRecord>,
    chunks: DashMap<ChunkKey, ChunkRecord>,
    tombstones: DashMap<FileId, Tombstone>,
    deleted: DashMap<FileId, DateTime<Utc>>,
}

impl Tables {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Tables {
            files: snapshot
                .files
                .into_iter()
                .map(|record| (record.file_id, record))
                .collect(),
            chunks: snapshot
                .chunks
                .into_iter()
                .map(|record| (record.key, record))
                .collect(),
            tombstones: snapshot
                .tombstones
                .into_iter()
                .map(|tombstone| (tombstone.file_id, tombstone))
                .collect(),
            deleted: snapshot.deleted.into_iter().collect(),
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            files: self.files.iter().map(|entry| entry.value().clone()).collect(),
            chunks: self.chunks.iter().map(|entry| entry.value().clone()).collect(),
            tombstones: self
                .tombstones
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
            deleted: self
                .deleted
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

/// A mutating call returns once a snapshot containing its change is on disk.
#[derive(Debug)]
pub struct Ledger {
    tables: Arc<Tables>,
    restores: DashMap<FileId, ReassemblyBuffer>,
    pending_stores: DashMap<ChunkKey, BTreeSet<PeerId>>,
    reply_watches: DashMap<ChunkKey, bool>,
    persister: Option<Persister>,
}

impl Ledger {
    pub fn in_memory() -> Self {
        Ledger::new(Arc::default(), None)
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let snapshot = persist::load(path).await?.unwrap_or_default();
        let tables = Arc::new(Tables::from_snapshot(snapshot));
        let persister = Persister::start(path.to_owned(), tables.clone());
        Ok(Ledger::new(tables, Some(persister)))
    }

    fn new(tables: Arc<Tables>, persister: Option<Persister>) -> Self {
        Ledger {
            tables,
            restores: DashMap::new(),
            pending_stores: DashMap::new(),
            reply_watches: DashMap::new(),
            persister,
        }
    }

    async fn save(&self) -> Result<()> {
        match &self.persister {
            Some(persister) => persister.save().await,
            None => OK,
        }
    }

    pub fn file_by_path(&self, path: &Path) -> Option<FileRecord> {
        self.tables
            .files
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| entry.value().clone())
    }

    pub fn file(&self, file_id: &FileId) -> Option<FileRecord> {
        self.tables.files.get(file_id).map(|entry| entry.value().clone())
    }

    pub fn is_own_file(&self, file_id: &FileId) -> bool {
        self.tables.files.contains_key(file_id)
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.tables
            .files
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub async fn add_file(&self, record: FileRecord) -> Result<bool> {
        let added = match self.tables.files.entry(record.file_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        };

        if added {
            self.save().await?;
        }
        Ok(added)
    }

    pub async fn set_replication_degree(&self, file_id: &FileId, degree: u8) -> Result<bool> {
        let changed = self
            .tables
            .files
            .get_mut(file_id)
            .is_some_and(|mut record| {
                let changed = record.replication_degree != degree;
                record.replication_degree = degree;
                changed
            });

        if changed {
            self.save().await?;
        }
        Ok(changed)
    }

    pub async fn remove_file(&self, file_id: &FileId) -> Result<Option<FileRecord>> {
        let removed = self.tables.files.remove(file_id).map(|(_, record)| record);
        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn add_confirmation(&self, key: &ChunkKey, peer: PeerId) -> Result<bool> {
        let added = self.update_replicas(key, |replicas| replicas.holders.insert(peer));
        if added {
            self.save().await?;
        }
        Ok(added)
    }

    pub async fn remove_confirmation(&self, key: &ChunkKey, peer: PeerId) -> Result<bool> {
        let removed = self.update_replicas(key, |replicas| replicas.holders.remove(&peer));
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    fn update_replicas<F>(&self, key: &ChunkKey, update: F) -> bool
    where
        F: FnOnce(&mut ChunkReplicas) -> bool,
    {
        let Some(mut record) = self.tables.files.get_mut(&key.file_id) else {
            return false;
        };

        record
            .chunks
            .get_mut(key.chunk_no as usize)
            .map_or(false, update)
    }

    pub fn confirmations(&self, key: &ChunkKey) -> usize {
        self.tables
            .files
            .get(&key.file_id)
            .and_then(|record| {
                record
                    .chunks
                    .get(key.chunk_no as usize)
                    .map(|replicas| replicas.holders.len())
            })
            .unwrap_or(0)
    }

    pub fn has_chunk(&self, key: &ChunkKey) -> bool {
        self.tables.chunks.contains_key(key)
    }

    pub fn chunk(&self, key: &ChunkKey) -> Option<ChunkRecord> {
        self.tables.chunks.get(key).map(|entry| entry.value().clone())
    }

    pub fn stored_chunks(&self) -> Vec<ChunkRecord> {
        self.tables
            .chunks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub async fn add_chunk(&self, record: ChunkRecord) -> Result<bool> {
        let key = record.key;
        let added = match self.tables.chunks.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        };

        let mut merged = false;
        if let Some((_, mirrors)) = self.pending_stores.remove(&key) {
            if let Some(mut record) = self.tables.chunks.get_mut(&key) {
                let before = record.mirrors.len();
                record.mirrors.extend(mirrors);
                merged = record.mirrors.len() > before;
            }
        }

        if added || merged {
            self.save().await?;
        }
        Ok(added)
    }

    pub async fn remove_chunk(&self, key: &ChunkKey) -> Result<Option<ChunkRecord>> {
        let removed = self.tables.chunks.remove(key).map(|(_, record)| record);
        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn remove_file_chunks(&self, file_id: &FileId) -> Result<Vec<ChunkRecord>> {
        let keys: Vec<ChunkKey> = self
            .tables
            .chunks
            .iter()
            .filter(|entry| entry.key().file_id == *file_id)
            .map(|entry| *entry.key())
            .collect();

        let removed: Vec<ChunkRecord> = keys
            .iter()
            .filter_map(|key| self.tables.chunks.remove(key).map(|(_, record)| record))
            .collect();

        if !removed.is_empty() {
            self.save().await?;
        }
        Ok(removed)
    }

    pub fn begin_store(&self, key: ChunkKey) {
        self.pending_stores.entry(key).or_default();
    }

    pub fn abandon_store(&self, key: &ChunkKey) {
        self.pending_stores.remove(key);
    }

    pub fn add_pending_mirror(&self, key: &ChunkKey, peer: PeerId) -> bool {
        self.pending_stores
            .get_mut(key)
            .map(|mut mirrors| mirrors.insert(peer))
            .is_some()
    }

    pub async fn add_mirror(&self, key: &ChunkKey, peer: PeerId) -> Result<bool> {
        let added = self
            .tables
            .chunks
            .get_mut(key)
            .map_or(false, |mut record| record.mirrors.insert(peer));

        if added {
            self.save().await?;
        }
        Ok(added)
    }

    pub async fn remove_mirror(&self, key: &ChunkKey, peer: PeerId) -> Result<Option<bool>> {
        let removed = self
            .tables
            .chunks
            .get_mut(key)
            .map(|mut record| record.mirrors.remove(&peer));

        if removed == Some(true) {
            self.save().await?;
        }
        Ok(removed)
    }

    pub fn perceived_replication(&self, key: &ChunkKey) -> Option<usize> {
        self.tables
            .chunks
            .get(key)
            .map(|record| record.perceived_replication())
    }

    pub fn desired_replication(&self, key: &ChunkKey) -> Option<u8> {
        self.tables
            .chunks
            .get(key)
            .map(|record| record.replication_degree)
    }

    pub async fn mark_deleted(&self, file_id: FileId, grace: Duration) -> Result<()> {
        let now = Utc::now();
        self.tables
            .deleted
            .retain(|_, deleted_at| !is_expired(*deleted_at, now, grace));
        self.tables.deleted.insert(file_id, now);
        self.save().await
    }

    pub fn is_deleted(&self, file_id: &FileId, grace: Duration) -> bool {
        self.tables
            .deleted
            .get(file_id)
            .is_some_and(|deleted_at| !is_expired(*deleted_at, Utc::now(), grace))
    }

    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.tables
            .tombstones
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn is_tombstoned(&self, file_id: &FileId) -> bool {
        self.tables.tombstones.contains_key(file_id)
    }

    pub async fn add_tombstone(&self, file_id: FileId, holders: BTreeSet<PeerId>) -> Result<()> {
        if holders.is_empty() {
            return OK;
        }

        self.tables
            .tombstones
            .entry(file_id)
            .or_insert_with(|| Tombstone {
                file_id,
                holders: BTreeSet::new(),
            })
            .holders
            .extend(holders);

        self.save().await
    }

    pub async fn remove_tombstone(&self, file_id: &FileId) -> Result<bool> {
        let removed = self.tables.tombstones.remove(file_id).is_some();
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn take_tombstones_for(&self, peer: PeerId) -> Result<Vec<FileId>> {
        let mut file_ids = vec![];
        self.tables.tombstones.retain(|file_id, tombstone| {
            if tombstone.holders.remove(&peer) {
                file_ids.push(*file_id);
            }
            !tombstone.holders.is_empty()
        });

        if !file_ids.is_empty() {
            self.save().await?;
        }
        Ok(file_ids)
    }

    pub fn begin_restore(&self, file_id: FileId, expected: usize) -> Result<Arc<Notify>> {
        match self.restores.entry(file_id) {
            Entry::Occupied(_) => Err(Error::RestoreInProgress(file_id)),
            Entry::Vacant(entry) => {
                let buffer = ReassemblyBuffer::new(expected);
                let notify = buffer.notify.clone();
                entry.insert(buffer);
                Ok(notify)
            }
        }
    }

    pub fn restore_status(&self, file_id: &FileId) -> RestoreStatus {
        match self.restores.get(file_id) {
            Some(buffer) => RestoreStatus::Restoring {
                received: buffer.chunks.len(),
                expected: buffer.expected,
            },
            None => RestoreStatus::Idle,
        }
    }

    pub fn missing_chunks(&self, file_id: &FileId) -> Vec<u32> {
        self.restores
            .get(file_id)
            .map(|buffer| buffer.missing())
            .unwrap_or_default()
    }

    pub fn add_restored_chunk(&self, key: &ChunkKey, data: Vec<u8>) -> Option<bool> {
        let (added, notify) = {
            let mut buffer = self.restores.get_mut(&key.file_id)?;
            let in_range = (key.chunk_no as usize) < buffer.expected;
            let added = in_range && !buffer.chunks.contains_key(&key.chunk_no);
            if added {
                buffer.chunks.insert(key.chunk_no, data);
            }
            (added, buffer.notify.clone())
        };

        if added {
            debug!("received chunk {key} for restore");
            notify.notify_one();
        }
        Some(added)
    }

    pub fn finish_restore(&self, file_id: &FileId) -> Option<Vec<u8>> {
        let (_, buffer) = self.restores.remove(file_id)?;
        buffer.is_complete().then(|| buffer.assemble())
    }

    pub fn watch_reply(&self, key: ChunkKey) {
        self.reply_watches.entry(key).or_insert(false);
    }

    pub fn note_reply(&self, key: &ChunkKey) {
        if let Some(mut seen) = self.reply_watches.get_mut(key) {
            *seen = true;
        }
    }

    pub fn finish_watch(&self, key: &ChunkKey) -> bool {
        self.reply_watches
            .remove(key)
            .is_some_and(|(_, seen)| seen)
    }
}

fn is_expired(deleted_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> bool {
    chrono::Duration::from_std(grace).map_or(false, |grace| now - deleted_at >= grace)
}
