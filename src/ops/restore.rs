use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::builder::styling::AnsiColor;
use log::{debug, info};
use tokio::{
    fs,
    sync::Notify,
    time::{timeout_at, Instant},
};

use crate::{
    error::{Error, Result, OK},
    format::{format_path, format_size},
    hash::FileId,
    ledger::RestoreStatus,
    message::{ChunkKey, Message},
    peer::PeerState,
};

use super::find_file;

#[derive(Debug, Clone)]
pub struct Restored {
    pub file_id: FileId,
    pub path: PathBuf,
    pub output: PathBuf,
    pub data: Vec<u8>,
}

pub async fn restore(state: Arc<PeerState>, path: &Path) -> Result<Restored> {
    let record = find_file(&state, path).await?;
    let file_id = record.file_id;
    let expected = record.chunk_count();

    let notify = state.ledger.begin_restore(file_id, expected)?;
    let requested = request_chunks(&state, file_id, &notify).await;
    let status = state.ledger.restore_status(&file_id);
    let data = state.ledger.finish_restore(&file_id);
    requested?;

    let Some(data) = data else {
        let received = match status {
            RestoreStatus::Restoring { received, .. } => received,
            RestoreStatus::Idle => 0,
        };
        return Err(Error::RestoreIncomplete {
            file_id,
            received,
            expected,
        });
    };

    let output = state.config.restores_dir().join(&record.name);
    fs::write(&output, &data).await?;

    let style = AnsiColor::Green.on_default();
    info!(
        "{style}restored{style:#} {} to {} ({})",
        format_path(&record.path),
        format_path(&output),
        format_size(data.len() as u64),
    );

    Ok(Restored {
        file_id,
        path: record.path,
        output,
        data,
    })
}

async fn request_chunks(state: &PeerState, file_id: FileId, notify: &Notify) -> Result<()> {
    let mut wait = state.config.retry_interval;

    for round in 1..=state.config.restore_attempts {
        let missing = state.ledger.missing_chunks(&file_id);
        if missing.is_empty() {
            return OK;
        }

        debug!("requesting {} chunks of {file_id} (round {round})", missing.len());
        for chunk_no in missing {
            let key = ChunkKey::new(file_id, chunk_no);
            let request = Message::get_chunk(state.version(), state.id(), key);
            state.multicast(&request).await?;
        }

        let deadline = Instant::now() + wait;
        while !state.ledger.missing_chunks(&file_id).is_empty() {
            if timeout_at(deadline, notify.notified()).await.is_err() {
                break;
            }
        }
        wait *= 2;
    }

    OK
}
