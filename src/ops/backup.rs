use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use clap::builder::styling::AnsiColor;
use log::{info, warn};
use serde::Serialize;
use tokio::{fs, sync::Semaphore, task::JoinSet};

use crate::{
    error::{Error, Result},
    format::{format_path, format_size},
    hash::FileId,
    ledger::{ChunkReplicas, FileRecord},
    message::{ChunkKey, MAX_REPLICATION_DEGREE},
    peer::PeerState,
    protocol::{replicate_chunk, Replication},
};

use super::delete::delete_file;

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub file_id: FileId,
    pub path: PathBuf,
    pub size: u64,
    pub chunks: Vec<Replication>,
}

impl BackupReport {
    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(Replication::is_satisfied)
    }

    pub fn under_replicated(&self) -> impl Iterator<Item = &Replication> {
        self.chunks.iter().filter(|chunk| !chunk.is_satisfied())
    }
}

/// Splits file contents into chunks of `chunk_size` bytes.
///
/// The last chunk is always shorter than `chunk_size`, so a file whose size
/// is an exact multiple (including an empty file) ends with an empty chunk.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    let mut chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
    if data.len() % chunk_size == 0 {
        chunks.push(&[]);
    }
    chunks
}

pub async fn backup(
    state: Arc<PeerState>,
    path: &Path,
    replication_degree: u8,
) -> Result<BackupReport> {
    if !(1..=MAX_REPLICATION_DEGREE).contains(&replication_degree) {
        return Err(Error::InvalidReplicationDegree(replication_degree));
    }

    let path = match fs::canonicalize(path).await {
        Ok(path) => path,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::FileDoesNotExist(path.to_owned()));
        }
        Err(err) => return Err(err.into()),
    };
    let metadata = fs::metadata(&path).await?;
    if !metadata.is_file() {
        return Err(Error::FileDoesNotExist(path));
    }

    let data = fs::read(&path).await?;
    let size = data.len() as u64;
    let modified: DateTime<Utc> = metadata.modified()?.into();
    let file_id = FileId::derive(&path, size, modified);
    let formatted_path = format_path(&path);

    if let Some(previous) = state.ledger.file_by_path(&path) {
        if previous.file_id != file_id {
            info!("{formatted_path} changed since its last backup, deleting old version");
            delete_file(&state, previous).await?;
        }
    }

    let chunks = split_chunks(&data, state.config.chunk_size);
    let name = path
        .file_name()
        .map_or_else(|| file_id.to_string(), |name| name.to_string_lossy().into_owned());
    let record = FileRecord {
        file_id,
        path: path.clone(),
        name,
        replication_degree,
        backed_up: Utc::now(),
        chunks: chunks
            .iter()
            .map(|chunk| ChunkReplicas::new(chunk.len() as u64))
            .collect(),
    };
    if !state.ledger.add_file(record).await?
        && state
            .ledger
            .set_replication_degree(&file_id, replication_degree)
            .await?
    {
        info!("replication degree of {formatted_path} is now {replication_degree}");
    }
    // backing the file up again withdraws an earlier deletion
    state.ledger.remove_tombstone(&file_id).await?;

    let semaphore = Arc::new(Semaphore::new(state.config.workers.max(1)));
    let mut tasks = JoinSet::new();
    for (chunk_no, chunk) in chunks.into_iter().enumerate() {
        let state = state.clone();
        let permit = semaphore.clone().acquire_owned().await?;
        let key = ChunkKey::new(file_id, u32::try_from(chunk_no).map_err(Error::other)?);
        let data = chunk.to_vec();

        tasks.spawn(async move {
            let ledger = &state.ledger;
            let result = replicate_chunk(&state, key, replication_degree, data, || {
                ledger.confirmations(&key)
            })
            .await;
            drop(permit);
            result
        });
    }

    let mut replications = vec![];
    while let Some(result) = tasks.join_next().await {
        replications.push(result??);
    }
    replications.sort_by_key(|replication| replication.key.chunk_no);

    let report = BackupReport {
        file_id,
        path,
        size,
        chunks: replications,
    };

    let msg_style = AnsiColor::Blue.on_default();
    let size_style = AnsiColor::BrightBlack.on_default();
    info!(
        "{msg_style}backed up{msg_style:#} {formatted_path} as {file_id} {size_style}({}, {} chunks){size_style:#}",
        format_size(size),
        report.chunks.len(),
    );
    let under_replicated = report.under_replicated().count();
    if under_replicated > 0 {
        warn!("{under_replicated} chunks of {formatted_path} are below replication degree {replication_degree}");
    }

    Ok(report)
}
