mod backup;
mod delete;
mod reclaim;
mod restore;
mod state;

use std::path::Path;

use tokio::fs;

use crate::{
    error::{Error, Result},
    ledger::FileRecord,
    peer::PeerState,
};

pub use self::{
    backup::{backup, split_chunks, BackupReport},
    delete::delete,
    reclaim::{reclaim, ReclaimReport},
    restore::{restore, Restored},
    state::{snapshot, ChunkSnapshot, FileSnapshot, PeerSnapshot, StorageSnapshot},
};

async fn find_file(state: &PeerState, path: &Path) -> Result<FileRecord> {
    let path = fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_owned());
    state
        .ledger
        .file_by_path(&path)
        .ok_or(Error::FileNotBackedUp(path))
}
