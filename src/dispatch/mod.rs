mod repairs;


use std::{future::Future, sync::Arc};

use async_channel::Receiver;
use log::{debug, trace, warn};

use crate::{
    error::Result,
    message::{Message, MessageType},
    peer::PeerState,
    protocol,
    task::WorkerPool,
};

pub use self::repairs::RepairTimers;
pub(crate) use self::repairs::random_delay;

/// Routes inbound messages in arrival order; disk and network work goes to
/// the worker pool.
#[derive(Debug)]
pub struct Dispatcher {
    state: Arc<PeerState>,
    queue: Receiver<Vec<u8>>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(state: Arc<PeerState>, queue: Receiver<Vec<u8>>) -> Self {
        let pool = WorkerPool::new(state.config.workers);
        Dispatcher { state, queue, pool }
    }

    pub async fn run(mut self) {
        while let Ok(bytes) = self.queue.recv().await {
            self.pool.reap();
            match Message::decode(&bytes) {
                Ok(message) => self.dispatch(message),
                Err(err) => warn!("dropped inbound message: {err}"),
            }
        }

        self.pool.join_all().await;
        debug!("dispatcher of peer {} stopped", self.state.id());
    }

    fn dispatch(&mut self, message: Message) {
        if message.sender == self.state.id() {
            trace!("ignoring own {}", message.kind);
            return;
        }

        debug!("received {message}");
        match message.kind {
            MessageType::PutChunk => self.on_put_chunk(message),
            MessageType::Stored => self.on_stored(message),
            MessageType::GetChunk => self.on_get_chunk(message),
            MessageType::Chunk => self.on_chunk(message),
            MessageType::Delete => self.spawn(message, protocol::delete_chunks),
            MessageType::Removed => self.spawn(message, protocol::record_removed),
            MessageType::Alive => self.spawn(message, protocol::answer_alive),
        }
    }

    fn on_put_chunk(&mut self, message: Message) {
        let key = match message.chunk_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("dropped {message}: {err}");
                return;
            }
        };

        let ledger = &self.state.ledger;
        if ledger.has_chunk(&key) {
            // Another holder is already re-sending this chunk.
            self.state.repairs.cancel(&key);
            self.spawn(message, protocol::announce_stored);
        } else if ledger.is_own_file(&key.file_id) {
            trace!("not storing chunk {key} of a file backed up by this peer");
        } else if ledger.is_deleted(&key.file_id, self.state.config.delete_grace) {
            trace!("not storing chunk {key} of a deleted file");
        } else {
            ledger.begin_store(key);
            self.spawn(message, protocol::store_chunk);
        }
    }

    fn on_get_chunk(&mut self, message: Message) {
        let key = match message.chunk_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("dropped {message}: {err}");
                return;
            }
        };

        if !self.state.ledger.has_chunk(&key) {
            trace!("chunk {key} is not stored here");
            return;
        }
        if !protocol::replies_directly(&self.state, &message) {
            // CHUNKs seen from here on suppress this peer's own reply
            self.state.ledger.watch_reply(key);
        }
        self.spawn(message, protocol::send_chunk);
    }

    fn on_stored(&mut self, message: Message) {
        let pending = message
            .chunk_key()
            .is_ok_and(|key| self.state.ledger.add_pending_mirror(&key, message.sender));
        if !pending {
            self.spawn(message, protocol::record_stored);
        }
    }

    fn on_chunk(&mut self, message: Message) {
        let key = match message.chunk_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("dropped {message}: {err}");
                return;
            }
        };

        let ledger = &self.state.ledger;
        ledger.note_reply(&key);
        match ledger.add_restored_chunk(&key, message.body) {
            Some(true) => {}
            Some(false) => trace!("duplicate chunk {key}"),
            None => trace!("chunk {key} is not being restored here"),
        }
    }

    fn spawn<F, Fut>(&mut self, message: Message, handler: F)
    where
        F: FnOnce(Arc<PeerState>, Message) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let label = format!("handling {message}");
        let task = handler(self.state.clone(), message);
        self.pool.spawn(label, task);
    }
}
