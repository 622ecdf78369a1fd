#[cfg(test)]
mod tests;

use std::{path::Path, sync::Arc, time::Duration};

use clap::builder::styling::AnsiColor;
use log::{debug, info, warn};
use tokio::{fs, spawn, task::JoinHandle, time::interval};

use crate::{
    config::PeerConfig,
    dispatch::{Dispatcher, RepairTimers},
    error::Result,
    format::{format_path, format_size},
    ledger::Ledger,
    message::Message,
    ops::{self, BackupReport, PeerSnapshot, ReclaimReport, Restored},
    storage::{ChunkStore, StorageAccountant},
    transport::{Channel, Intake, Transport},
};

pub type PeerId = u32;

#[derive(Debug)]
pub struct PeerState {
    pub config: PeerConfig,
    pub ledger: Ledger,
    pub chunks: ChunkStore,
    pub transport: Arc<dyn Transport>,
    pub repairs: RepairTimers,
}

impl PeerState {
    pub fn id(&self) -> PeerId {
        self.config.id
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub async fn multicast(&self, message: &Message) -> Result<()> {
        let channel = Channel::for_message(message.kind);
        debug!("sending {message} on {channel} channel");
        self.transport.send(channel, message.encode()).await
    }
}

#[derive(Debug)]
pub struct Peer {
    state: Arc<PeerState>,
    intake: Intake,
    tasks: Vec<JoinHandle<()>>,
}

impl Peer {
    pub async fn open(config: PeerConfig, transport: Arc<dyn Transport>) -> Result<Peer> {
        fs::create_dir_all(config.peer_dir()).await?;
        fs::create_dir_all(config.restores_dir()).await?;

        let ledger = Ledger::open(&config.ledger_path()).await?;
        let accountant = StorageAccountant::open(&config.budget_path(), config.capacity).await?;
        let chunks = ChunkStore::open(&config.chunks_dir(), Arc::new(accountant)).await?;
        let budget = chunks.accountant().budget().await;

        let state = Arc::new(PeerState {
            config,
            ledger,
            chunks,
            transport,
            repairs: RepairTimers::default(),
        });

        let (intake, queue) = async_channel::unbounded();
        let mut tasks = vec![spawn(Dispatcher::new(state.clone(), queue).run())];
        if let Some(period) = state.config.alive_interval {
            tasks.push(spawn(announce_alive(state.clone(), period)));
        }

        let style = AnsiColor::Green.on_default();
        info!(
            "{style}peer {} ready{style:#} in {} ({} of {} used)",
            state.id(),
            format_path(&state.config.peer_dir()),
            format_size(budget.used),
            format_size(budget.capacity),
        );

        Ok(Peer {
            state,
            intake,
            tasks,
        })
    }

    pub fn id(&self) -> PeerId {
        self.state.id()
    }

    pub fn intake(&self) -> Intake {
        self.intake.clone()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.state.chunks
    }

    pub async fn backup(&self, path: &Path, replication_degree: u8) -> Result<BackupReport> {
        ops::backup(self.state.clone(), path, replication_degree).await
    }

    pub async fn restore(&self, path: &Path) -> Result<Restored> {
        ops::restore(self.state.clone(), path).await
    }

    pub async fn delete(&self, path: &Path) -> Result<()> {
        ops::delete(self.state.clone(), path).await
    }

    pub async fn reclaim(&self, capacity: u64) -> Result<ReclaimReport> {
        ops::reclaim(self.state.clone(), capacity).await
    }

    pub async fn state(&self) -> PeerSnapshot {
        ops::snapshot(&self.state).await
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.intake.close();
        for task in &self.tasks {
            task.abort();
        }
        self.state.repairs.cancel_all();
    }
}

async fn announce_alive(state: Arc<PeerState>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let message = Message::alive(state.version(), state.id());
        if let Err(err) = state.multicast(&message).await {
            warn!("could not announce peer {}: {err}", state.id());
        }
    }
}
