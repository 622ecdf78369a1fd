use log::{debug, warn};
use serde::Serialize;
use tokio::time::sleep;

use crate::{
    error::Result,
    message::{ChunkKey, Message},
    peer::PeerState,
    transport::Channel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Replication {
    pub key: ChunkKey,
    pub desired: u8,
    pub confirmed: usize,
    pub attempts: u32,
}

impl Replication {
    pub fn is_satisfied(&self) -> bool {
        self.confirmed >= usize::from(self.desired)
    }
}

pub async fn replicate_chunk<F>(
    state: &PeerState,
    key: ChunkKey,
    desired: u8,
    data: Vec<u8>,
    confirmed: F,
) -> Result<Replication>
where
    F: Fn() -> usize,
{
    let bytes = Message::put_chunk(state.version(), state.id(), key, desired, data).encode();
    let mut wait = state.config.retry_interval;
    let mut replication = Replication {
        key,
        desired,
        confirmed: confirmed(),
        attempts: 0,
    };

    while replication.attempts < state.config.backup_attempts {
        replication.attempts += 1;
        state.transport.send(Channel::Backup, bytes.clone()).await?;
        sleep(wait).await;

        replication.confirmed = confirmed();
        if replication.is_satisfied() {
            debug!(
                "chunk {key} reached {} replicas after {} attempts",
                replication.confirmed, replication.attempts
            );
            return Ok(replication);
        }
        wait *= 2;
    }

    warn!(
        "chunk {key} has {} of {desired} replicas after {} attempts",
        replication.confirmed, replication.attempts
    );
    Ok(replication)
}
