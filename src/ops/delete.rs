use std::{path::Path, sync::Arc};

use clap::builder::styling::AnsiColor;
use log::info;
use tokio::time::sleep;

use crate::{
    error::Result,
    format::{format_path, format_peers},
    ledger::FileRecord,
    message::Message,
    peer::PeerState,
};

use super::find_file;

pub async fn delete(state: Arc<PeerState>, path: &Path) -> Result<()> {
    let record = find_file(&state, path).await?;
    delete_file(&state, record).await
}

pub(super) async fn delete_file(state: &PeerState, record: FileRecord) -> Result<()> {
    let notice = Message::delete(state.version(), state.id(), record.file_id);
    for round in 0..state.config.delete_rounds {
        if round > 0 {
            sleep(state.config.retry_interval).await;
        }
        state.multicast(&notice).await?;
    }

    let holders = record.holders();
    state.ledger.add_tombstone(record.file_id, holders.clone()).await?;
    state.ledger.remove_file(&record.file_id).await?;

    let style = AnsiColor::Red.on_default();
    info!(
        "{style}deleted{style:#} {} ({}), last held by peers {}",
        format_path(&record.path),
        record.file_id,
        format_peers(&holders),
    );
    Ok(())
}
