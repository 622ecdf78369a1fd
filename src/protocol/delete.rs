use std::sync::Arc;

use clap::builder::styling::AnsiColor;
use log::{debug, info, trace};

use crate::{
    error::{Result, OK},
    format::format_size,
    message::Message,
    peer::PeerState,
};

pub async fn delete_chunks(state: Arc<PeerState>, message: Message) -> Result<()> {
    let file_id = message.file_id()?;

    state
        .ledger
        .mark_deleted(file_id, state.config.delete_grace)
        .await?;
    let records = state.ledger.remove_file_chunks(&file_id).await?;
    for record in &records {
        state.repairs.cancel(&record.key);
    }
    let freed = state.chunks.delete_file(&file_id).await?;

    if records.is_empty() && freed == 0 {
        trace!("no chunks of {file_id} stored here");
        return OK;
    }

    let style = AnsiColor::Red.on_default();
    info!(
        "{style}deleted{style:#} {} chunks of {file_id} ({})",
        records.len(),
        format_size(freed)
    );
    OK
}

pub async fn answer_alive(state: Arc<PeerState>, message: Message) -> Result<()> {
    let sender = message.sender;
    for file_id in state.ledger.take_tombstones_for(sender).await? {
        debug!("peer {sender} may have missed the deletion of {file_id}");
        let notice = Message::delete(state.version(), state.id(), file_id);
        state.multicast(&notice).await?;
    }

    OK
}
