mod from;

use std::{fmt::Display, path::PathBuf};

use thiserror::Error;

use crate::{hash::FileId, message::MessageType};

pub type Result<T> = std::result::Result<T, Error>;

pub const OK: Result<()> = Ok(());

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message type `{0}`")]
    UnknownMessageType(String),

    #[error("`{0}` field is missing from {1} message")]
    MissingField(&'static str, MessageType),

    #[error("file ID `{0}` is invalid")]
    InvalidFileId(String),

    #[error("chunk body has {0} bytes, more than the maximum of {1}")]
    ChunkTooLarge(usize, usize),

    #[error("replication degree {0} is out of range")]
    InvalidReplicationDegree(u8),

    #[error("`{0}` does not exist")]
    FileDoesNotExist(PathBuf),

    #[error("`{0}` has not been backed up by this peer")]
    FileNotBackedUp(PathBuf),

    #[error("file {0} is already being restored")]
    RestoreInProgress(FileId),

    #[error("restore of {file_id} received {received} of {expected} chunks")]
    RestoreIncomplete {
        file_id: FileId,
        received: usize,
        expected: usize,
    },

    #[error("need {needed} bytes of storage but only {available} are available")]
    InsufficientStorage { needed: u64, available: u64 },

    #[error("peer {0} has no known direct address")]
    UnknownPeer(u32),

    #[error("could not save ledger: {0}")]
    LedgerSave(String),

    #[error("control request failed: {0}")]
    Control(String),

    #[error("{0}")]
    Cli(String),

    #[error(transparent)]
    Other(AnyError),
}

#[derive(Error, Debug)]
pub struct AnyError(anyhow::Error);

impl Display for AnyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for AnyError {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl Error {
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(AnyError(error.into()))
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Other(AnyError(error))
    }
}
