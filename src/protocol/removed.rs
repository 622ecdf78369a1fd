use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    error::{Result, OK},
    message::{ChunkKey, Message},
    peer::PeerState,
};

use super::replicate_chunk;

pub async fn record_removed(state: Arc<PeerState>, message: Message) -> Result<()> {
    let key = message.chunk_key()?;
    let sender = message.sender;

    if state.ledger.is_own_file(&key.file_id) {
        if state.ledger.remove_confirmation(&key, sender).await? {
            debug!("peer {sender} no longer holds chunk {key}");
        }
        return OK;
    }

    if state.ledger.remove_mirror(&key, sender).await?.is_none() {
        warn!("ignoring removal of chunk {key} by peer {sender}: chunk is not stored here");
        return OK;
    }

    let Some(record) = state.ledger.chunk(&key) else {
        return OK;
    };
    if record.is_under_replicated() {
        let repair = repair_chunk(state.clone(), key);
        state.repairs.schedule(key, state.config.repair_delay, repair);
    }

    OK
}

pub async fn repair_chunk(state: Arc<PeerState>, key: ChunkKey) -> Result<()> {
    state.repairs.fired(&key);

    let Some(record) = state.ledger.chunk(&key) else {
        return OK;
    };
    if !record.is_under_replicated() {
        return OK;
    }
    let Some(data) = state.chunks.get(&key).await? else {
        warn!("cannot repair chunk {key}: missing from disk");
        return OK;
    };

    info!(
        "repairing chunk {key} ({} of {} replicas)",
        record.replication_with_self(),
        record.replication_degree
    );
    let ledger = &state.ledger;
    replicate_chunk(&state, key, record.replication_degree, data, || {
        ledger
            .chunk(&key)
            .map_or(0, |record| record.replication_with_self())
    })
    .await?;

    OK
}
