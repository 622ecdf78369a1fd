use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::{hash::FileId, message::ChunkKey, peer::PeerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: FileId,
    pub path: PathBuf,
    pub name: String,
    pub replication_degree: u8,
    pub backed_up: DateTime<Utc>,
    pub chunks: Vec<ChunkReplicas>,
}

impl FileRecord {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn size(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.size).sum()
    }

    pub fn holders(&self) -> BTreeSet<PeerId> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.holders.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReplicas {
    pub size: u64,
    pub holders: BTreeSet<PeerId>,
}

impl ChunkReplicas {
    pub fn new(size: u64) -> Self {
        ChunkReplicas {
            size,
            holders: BTreeSet::new(),
        }
    }
}

/// `mirrors` holds the *other* peers known to store the same chunk; this peer
/// is never a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub key: ChunkKey,
    pub size: u64,
    pub replication_degree: u8,
    pub mirrors: BTreeSet<PeerId>,
}

impl ChunkRecord {
    pub fn new(key: ChunkKey, size: u64, replication_degree: u8) -> Self {
        ChunkRecord {
            key,
            size,
            replication_degree,
            mirrors: BTreeSet::new(),
        }
    }

    pub fn perceived_replication(&self) -> usize {
        self.mirrors.len()
    }

    pub fn replication_with_self(&self) -> usize {
        self.perceived_replication() + 1
    }

    pub fn is_under_replicated(&self) -> bool {
        self.replication_with_self() < usize::from(self.replication_degree)
    }

    pub fn surplus(&self) -> i64 {
        self.replication_with_self() as i64 - i64::from(self.replication_degree)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub file_id: FileId,
    pub holders: BTreeSet<PeerId>,
}

#[derive(Debug)]
pub struct ReassemblyBuffer {
    pub expected: usize,
    pub chunks: BTreeMap<u32, Vec<u8>>,
    pub notify: Arc<Notify>,
}

impl ReassemblyBuffer {
    pub fn new(expected: usize) -> Self {
        ReassemblyBuffer {
            expected,
            chunks: BTreeMap::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() == self.expected
    }

    pub fn missing(&self) -> Vec<u32> {
        (0..self.expected as u32)
            .filter(|chunk_no| !self.chunks.contains_key(chunk_no))
            .collect()
    }

    pub fn assemble(self) -> Vec<u8> {
        self.chunks.into_values().flatten().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Idle,
    Restoring { received: usize, expected: usize },
}
