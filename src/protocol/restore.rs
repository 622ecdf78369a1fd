use std::sync::Arc;

use log::{trace, warn};
use tokio::time::sleep;

use crate::{
    dispatch::random_delay,
    error::{Result, OK},
    message::{Message, ENHANCED_VERSION},
    peer::PeerState,
};

pub async fn send_chunk(state: Arc<PeerState>, message: Message) -> Result<()> {
    let key = message.chunk_key()?;
    let direct = replies_directly(&state, &message);
    if !direct {
        sleep(random_delay(state.config.reply_delay)).await;
        if state.ledger.finish_watch(&key) {
            trace!("chunk {key} was already sent by another holder");
            return OK;
        }
    }

    if !state.ledger.has_chunk(&key) {
        trace!("chunk {key} is not stored here");
        return OK;
    }

    let Some(body) = state.chunks.get(&key).await? else {
        warn!("chunk {key} is recorded but missing from disk");
        return OK;
    };

    let reply = Message::chunk(state.version(), state.id(), key, body);
    if direct {
        match state.transport.send_to(message.sender, reply.encode()).await {
            Ok(()) => return OK,
            Err(err) => warn!(
                "direct send of chunk {key} to peer {} failed: {err}",
                message.sender
            ),
        }
    }

    state.multicast(&reply).await
}

pub fn replies_directly(state: &PeerState, request: &Message) -> bool {
    request.is_enhanced() && state.version() == ENHANCED_VERSION
}
