//! Handlers for inbound protocol messages. Each runs as one task in the
//! dispatcher's worker pool.

mod backup;
mod delete;
mod removed;
mod replicate;
mod restore;

pub use self::{
    backup::{announce_stored, record_stored, store_chunk},
    delete::{answer_alive, delete_chunks},
    removed::{record_removed, repair_chunk},
    replicate::{replicate_chunk, Replication},
    restore::{replies_directly, send_chunk},
};
