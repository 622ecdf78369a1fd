use std::{path::PathBuf, sync::Arc};

use async_channel::{Receiver, Sender};
use log::{trace, warn};
use tokio::{spawn, sync::oneshot};

use crate::{
    error::{Error, Result},
    format::format_path,
    persist,
};

use super::Tables;

type Ack = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(super) struct Persister {
    requests: Sender<Ack>,
}

impl Persister {
    pub fn start(path: PathBuf, tables: Arc<Tables>) -> Self {
        let (requests, queue) = async_channel::unbounded();
        spawn(run(path, tables, queue));
        Persister { requests }
    }

    pub async fn save(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.requests.send(ack).await?;
        done.await.map_err(Error::other)?
    }
}

async fn run(path: PathBuf, tables: Arc<Tables>, queue: Receiver<Ack>) {
    while let Ok(first) = queue.recv().await {
        let mut waiters = vec![first];
        while let Ok(next) = queue.try_recv() {
            waiters.push(next);
        }

        // the snapshot is taken after every queued mutation was applied
        let result = persist::save(&path, tables.snapshot())
            .await
            .map_err(|err| err.to_string());
        match &result {
            Ok(()) => trace!("saved ledger for {} mutations", waiters.len()),
            Err(err) => warn!("could not save ledger to {}: {err}", format_path(&path)),
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone().map_err(Error::LedgerSave));
        }
    }
}
