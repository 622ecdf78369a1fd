use std::{
    fmt::{self, Display},
    path::PathBuf,
};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    format::{format_path, format_size, format_time},
    peer::{PeerId, PeerState},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    pub name: String,
    pub path: PathBuf,
    pub file_id: String,
    pub replication_degree: u8,
    pub backed_up: String,
    pub chunks: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSnapshot {
    pub file_id: String,
    pub chunk_no: u32,
    pub size: u64,
    pub desired: u8,
    pub perceived: usize,
    pub repair_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageSnapshot {
    pub capacity: u64,
    pub used: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub files: Vec<FileSnapshot>,
    pub chunks: Vec<ChunkSnapshot>,
    pub storage: StorageSnapshot,
}

pub async fn snapshot(state: &PeerState) -> PeerSnapshot {
    let files = state
        .ledger
        .files()
        .into_iter()
        .sorted_by(|a, b| a.path.cmp(&b.path))
        .map(|record| FileSnapshot {
            name: record.name,
            path: record.path,
            file_id: record.file_id.to_string(),
            replication_degree: record.replication_degree,
            backed_up: format_time(&record.backed_up),
            chunks: record
                .chunks
                .iter()
                .map(|chunk| chunk.holders.len())
                .collect(),
        })
        .collect();

    let chunks = state
        .ledger
        .stored_chunks()
        .into_iter()
        .map(|record| ChunkSnapshot {
            file_id: record.key.file_id.to_string(),
            chunk_no: record.key.chunk_no,
            size: record.size,
            desired: record.replication_degree,
            perceived: record.replication_with_self(),
            repair_pending: state.repairs.is_pending(&record.key),
        })
        .sorted_by(|a, b| (&a.file_id, a.chunk_no).cmp(&(&b.file_id, b.chunk_no)))
        .collect();

    let budget = state.chunks.accountant().budget().await;
    PeerSnapshot {
        id: state.id(),
        files,
        chunks,
        storage: StorageSnapshot {
            capacity: budget.capacity,
            used: budget.used,
            available: budget.available(),
        },
    }
}

impl Display for PeerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "peer {}", self.id)?;

        writeln!(f, "files backed up: {}", self.files.len())?;
        for file in &self.files {
            writeln!(f, "  {} ({})", file.name, format_path(&file.path))?;
            writeln!(f, "    id: {}", file.file_id)?;
            writeln!(f, "    backed up: {}", file.backed_up)?;
            writeln!(f, "    desired replication: {}", file.replication_degree)?;
            for (chunk_no, replicas) in file.chunks.iter().enumerate() {
                writeln!(f, "    chunk {chunk_no}: {replicas} replicas")?;
            }
        }

        writeln!(f, "chunks stored: {}", self.chunks.len())?;
        for (file_id, chunks) in &self.chunks.iter().group_by(|chunk| &chunk.file_id) {
            writeln!(f, "  {file_id}")?;
            for chunk in chunks {
                write!(
                    f,
                    "    chunk {}: {}, {} of {} replicas",
                    chunk.chunk_no,
                    format_size(chunk.size),
                    chunk.perceived,
                    chunk.desired,
                )?;
                if chunk.repair_pending {
                    write!(f, " (repair pending)")?;
                }
                writeln!(f)?;
            }
        }

        write!(
            f,
            "storage: {} used of {} ({} available)",
            format_size(self.storage.used),
            format_size(self.storage.capacity),
            format_size(self.storage.available),
        )
    }
}
