use std::sync::Arc;

use clap::builder::styling::AnsiColor;
use log::{debug, info};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    format::format_size,
    ledger::ChunkRecord,
    message::{ChunkKey, Message},
    peer::PeerState,
};

#[derive(Debug, Clone, Serialize)]
pub struct ReclaimReport {
    pub capacity: u64,
    pub evicted: Vec<ChunkKey>,
    pub freed: u64,
}

pub async fn reclaim(state: Arc<PeerState>, capacity: u64) -> Result<ReclaimReport> {
    let accountant = state.chunks.accountant();
    let mut report = ReclaimReport {
        capacity,
        evicted: vec![],
        freed: 0,
    };

    while !accountant.resize(capacity).await? {
        let chunks = state.ledger.stored_chunks();
        let Some(record) = next_eviction(&chunks) else {
            let budget = accountant.budget().await;
            return Err(Error::InsufficientStorage {
                needed: budget.used,
                available: capacity,
            });
        };

        report.freed += evict(&state, record).await?;
        report.evicted.push(record.key);
    }

    let style = AnsiColor::Yellow.on_default();
    info!(
        "{style}reclaimed{style:#} {} from {} chunks, capacity is now {}",
        format_size(report.freed),
        report.evicted.len(),
        format_size(capacity),
    );
    Ok(report)
}

fn next_eviction(chunks: &[ChunkRecord]) -> Option<&ChunkRecord> {
    chunks
        .iter()
        .max_by_key(|record| (record.surplus(), record.size))
}

async fn evict(state: &PeerState, record: &ChunkRecord) -> Result<u64> {
    let key = record.key;
    state.repairs.cancel(&key);
    state.ledger.remove_chunk(&key).await?;
    let freed = state.chunks.delete(&key).await?.unwrap_or(0);

    let notice = Message::removed(state.version(), state.id(), key);
    state.multicast(&notice).await?;

    debug!("evicted chunk {key} ({})", format_size(freed));
    Ok(freed)
}
