use std::{collections::BTreeSet, sync::Arc};

use clap::builder::styling::AnsiColor;
use log::{debug, info};

use crate::{
    error::{Result, OK},
    format::format_size,
    ledger::ChunkRecord,
    message::{ChunkKey, Message},
    peer::PeerState,
    storage::SaveState,
};

pub async fn store_chunk(state: Arc<PeerState>, message: Message) -> Result<()> {
    let key = message.chunk_key()?;
    let replication_degree = message.replication_degree()?;

    let size = message.body.len() as u64;
    let saved = state.chunks.put(&key, &message.body).await;
    if !matches!(saved, Ok(SaveState::Saved | SaveState::Exists)) {
        state.ledger.abandon_store(&key);
    }

    match saved? {
        SaveState::Full => {
            info!(
                "no room for chunk {key} ({}) from peer {}",
                format_size(size),
                message.sender
            );
            return OK;
        }
        SaveState::Exists => debug!("chunk {key} was already on disk"),
        SaveState::Saved => {
            let msg_style = AnsiColor::Blue.on_default();
            let size_style = AnsiColor::BrightBlack.on_default();
            debug!(
                "{msg_style}stored chunk{msg_style:#} {key} {size_style}({}){size_style:#}",
                format_size(size)
            );
        }
    }

    let record = ChunkRecord::new(key, size, replication_degree);
    state.ledger.add_chunk(record).await?;

    // a DELETE handled while the chunk was being written did not see it
    if state
        .ledger
        .is_deleted(&key.file_id, state.config.delete_grace)
    {
        debug!("dropping chunk {key} of a file deleted meanwhile");
        state.ledger.remove_chunk(&key).await?;
        state.chunks.delete(&key).await?;
        return OK;
    }

    send_stored(&state, key).await
}

pub async fn announce_stored(state: Arc<PeerState>, message: Message) -> Result<()> {
    let key = message.chunk_key()?;
    send_stored(&state, key).await
}

pub async fn record_stored(state: Arc<PeerState>, message: Message) -> Result<()> {
    let key = message.chunk_key()?;
    let sender = message.sender;

    if state.ledger.has_chunk(&key) {
        if state.ledger.add_mirror(&key, sender).await? {
            debug!("peer {sender} mirrors chunk {key}");
        }
    } else if state.ledger.is_tombstoned(&key.file_id) {
        debug!("peer {sender} stored chunk {key} of a deleted file");
        state
            .ledger
            .add_tombstone(key.file_id, BTreeSet::from([sender]))
            .await?;
        let notice = Message::delete(state.version(), state.id(), key.file_id);
        state.multicast(&notice).await?;
    } else if state.ledger.is_own_file(&key.file_id)
        && state.ledger.add_confirmation(&key, sender).await?
    {
        debug!("peer {sender} confirmed chunk {key}");
    }

    OK
}

async fn send_stored(state: &PeerState, key: ChunkKey) -> Result<()> {
    let reply = Message::stored(state.version(), state.id(), key);
    state.multicast(&reply).await
}
