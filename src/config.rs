use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    message::{BASE_VERSION, MAX_CHUNK_SIZE},
    peer::PeerId,
};

pub const DEFAULT_CAPACITY: u64 = 100 * 1000 * 1000;
pub const DEFAULT_WORKER_COUNT: usize = 16;
pub const DEFAULT_BACKUP_ATTEMPTS: u32 = 5;
pub const DEFAULT_RESTORE_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELETE_ROUNDS: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REPAIR_DELAY: Duration = Duration::from_millis(400);
pub const DEFAULT_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(400);
pub const DEFAULT_DELETE_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub id: PeerId,
    pub version: String,
    pub root: PathBuf,
    pub capacity: u64,
    pub workers: usize,
    pub chunk_size: usize,
    pub backup_attempts: u32,
    pub restore_attempts: u32,
    pub delete_rounds: u32,
    pub retry_interval: Duration,
    pub repair_delay: Duration,
    pub reply_delay: Duration,
    pub delete_grace: Duration,
    pub alive_interval: Option<Duration>,
}

impl PeerConfig {
    pub fn new(id: PeerId, root: &Path) -> Self {
        PeerConfig {
            id,
            version: BASE_VERSION.to_owned(),
            root: root.to_owned(),
            capacity: DEFAULT_CAPACITY,
            workers: DEFAULT_WORKER_COUNT,
            chunk_size: MAX_CHUNK_SIZE,
            backup_attempts: DEFAULT_BACKUP_ATTEMPTS,
            restore_attempts: DEFAULT_RESTORE_ATTEMPTS,
            delete_rounds: DEFAULT_DELETE_ROUNDS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            repair_delay: DEFAULT_REPAIR_DELAY,
            reply_delay: DEFAULT_REPLY_DELAY,
            delete_grace: DEFAULT_DELETE_GRACE,
            alive_interval: Some(DEFAULT_ALIVE_INTERVAL),
        }
    }

    pub fn peer_dir(&self) -> PathBuf {
        self.root.join(format!("peer-{}", self.id))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.peer_dir().join("ledger")
    }

    pub fn budget_path(&self) -> PathBuf {
        self.peer_dir().join("budget")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.peer_dir().join("chunks")
    }

    pub fn restores_dir(&self) -> PathBuf {
        self.peer_dir().join("restores")
    }
}
