use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{error::Result, persist};

/// Invariant: `used <= capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBudget {
    pub capacity: u64,
    pub used: u64,
}

impl StorageBudget {
    pub fn new(capacity: u64) -> Self {
        StorageBudget { capacity, used: 0 }
    }

    pub fn available(&self) -> u64 {
        self.capacity - self.used
    }
}

#[derive(Debug)]
pub struct StorageAccountant {
    path: PathBuf,
    budget: Mutex<StorageBudget>,
    save_lock: Mutex<()>,
}

impl StorageAccountant {
    pub async fn open(path: &Path, capacity: u64) -> Result<Self> {
        let budget = persist::load(path)
            .await?
            .unwrap_or_else(|| StorageBudget::new(capacity));

        Ok(StorageAccountant {
            path: path.to_owned(),
            budget: Mutex::new(budget),
            save_lock: Mutex::new(()),
        })
    }

    pub async fn budget(&self) -> StorageBudget {
        *self.budget.lock().await
    }

    pub async fn try_reserve(&self, bytes: u64) -> Result<bool> {
        {
            let mut budget = self.budget.lock().await;
            if budget.available() < bytes {
                return Ok(false);
            }
            budget.used += bytes;
        }

        self.save().await?;
        Ok(true)
    }

    pub async fn release(&self, bytes: u64) -> Result<()> {
        {
            let mut budget = self.budget.lock().await;
            budget.used = budget.used.saturating_sub(bytes);
        }

        self.save().await
    }

    pub async fn resize(&self, capacity: u64) -> Result<bool> {
        {
            let mut budget = self.budget.lock().await;
            if budget.used > capacity {
                return Ok(false);
            }
            budget.capacity = capacity;
        }

        self.save().await?;
        Ok(true)
    }

    // Always writes the latest budget, so concurrent saves cannot leave a
    // stale snapshot on disk.
    async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let budget = self.budget().await;
        persist::save(&self.path, budget).await
    }
}
