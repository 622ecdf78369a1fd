use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::debug;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};

use crate::{error::Result, hash::FileId, message::ChunkKey};

use super::StorageAccountant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Saved,
    Exists,
    Full,
}

#[derive(Debug)]
pub struct ChunkStore {
    root: PathBuf,
    accountant: Arc<StorageAccountant>,
}

impl ChunkStore {
    pub async fn open(root: &Path, accountant: Arc<StorageAccountant>) -> Result<Self> {
        fs::create_dir_all(root).await?;
        Ok(ChunkStore {
            root: root.to_owned(),
            accountant,
        })
    }

    pub fn accountant(&self) -> &Arc<StorageAccountant> {
        &self.accountant
    }

    fn file_dir(&self, file_id: &FileId) -> PathBuf {
        self.root.join(file_id.to_string())
    }

    fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.file_dir(&key.file_id).join(key.chunk_no.to_string())
    }

    pub async fn contains(&self, key: &ChunkKey) -> Result<bool> {
        let exists = fs::try_exists(self.chunk_path(key)).await?;
        Ok(exists)
    }

    pub async fn put(&self, key: &ChunkKey, data: &[u8]) -> Result<SaveState> {
        let path = self.chunk_path(key);
        if fs::try_exists(&path).await? {
            return Ok(SaveState::Exists);
        }

        let size = data.len() as u64;
        if !self.accountant.try_reserve(size).await? {
            return Ok(SaveState::Full);
        }

        match write_new(&path, data).await {
            Ok(()) => {
                debug!("stored chunk {key} ({size} bytes)");
                Ok(SaveState::Saved)
            }
            Err(err) => {
                self.accountant.release(size).await?;
                if err.kind() == io::ErrorKind::AlreadyExists {
                    return Ok(SaveState::Exists);
                }

                // a partial write must not occupy the slot
                let _ = fs::remove_file(&path).await;
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
        match fs::read(self.chunk_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(&self, key: &ChunkKey) -> Result<Option<u64>> {
        let path = self.chunk_path(key);
        let size = match fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        self.accountant.release(size).await?;
        debug!("deleted chunk {key} ({size} bytes)");
        Ok(Some(size))
    }

    pub async fn delete_file(&self, file_id: &FileId) -> Result<u64> {
        let dir = self.file_dir(file_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut freed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let Some(chunk_no) = entry.file_name().to_str().and_then(|s| s.parse().ok()) else {
                continue;
            };

            let key = ChunkKey::new(*file_id, chunk_no);
            freed += self.delete(&key).await?.unwrap_or(0);
        }

        if let Err(err) = fs::remove_dir(&dir).await {
            debug!("kept chunk directory for {file_id}: {err}");
        }

        Ok(freed)
    }
}

async fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}
