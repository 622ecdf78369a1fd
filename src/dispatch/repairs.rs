use std::{future::Future, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, warn};
use rand::Rng;
use tokio::{spawn, task::AbortHandle, time::sleep};

use crate::{error::Result, message::ChunkKey};

#[derive(Debug, Default)]
pub struct RepairTimers {
    pending: DashMap<ChunkKey, AbortHandle>,
}

impl RepairTimers {
    pub fn schedule<F>(&self, key: ChunkKey, max_delay: Duration, repair: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let delay = random_delay(max_delay);
        match self.pending.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!("repair of chunk {key} scheduled in {}ms", delay.as_millis());
                let task = spawn(async move {
                    sleep(delay).await;
                    if let Err(err) = repair.await {
                        warn!("repair of chunk {key} failed: {err}");
                    }
                });
                entry.insert(task.abort_handle());
                true
            }
        }
    }

    pub fn cancel(&self, key: &ChunkKey) -> bool {
        match self.pending.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                debug!("repair of chunk {key} cancelled");
                true
            }
            None => false,
        }
    }

    pub fn fired(&self, key: &ChunkKey) {
        self.pending.remove(key);
    }

    pub fn is_pending(&self, key: &ChunkKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn cancel_all(&self) {
        self.pending.retain(|_, handle| {
            handle.abort();
            false
        });
    }
}

pub(crate) fn random_delay(max_delay: Duration) -> Duration {
    let max_millis = u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_millis))
}
