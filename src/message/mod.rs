mod codec;


use std::{fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    hash::FileId,
    peer::PeerId,
};

pub use codec::peek_sender;

pub const MAX_CHUNK_SIZE: usize = 64_000;
pub const MAX_REPLICATION_DEGREE: u8 = 9;

pub const BASE_VERSION: &str = "1.0";
pub const ENHANCED_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    PutChunk,
    Stored,
    GetChunk,
    Chunk,
    Delete,
    Removed,
    Alive,
}

impl MessageType {
    pub fn name(self) -> &'static str {
        match self {
            MessageType::PutChunk => "PUTCHUNK",
            MessageType::Stored => "STORED",
            MessageType::GetChunk => "GETCHUNK",
            MessageType::Chunk => "CHUNK",
            MessageType::Delete => "DELETE",
            MessageType::Removed => "REMOVED",
            MessageType::Alive => "ALIVE",
        }
    }

    fn has_file_id(self) -> bool {
        !matches!(self, MessageType::Alive)
    }

    fn has_chunk_no(self) -> bool {
        !matches!(self, MessageType::Delete | MessageType::Alive)
    }

    fn has_replication_degree(self) -> bool {
        matches!(self, MessageType::PutChunk)
    }

    fn has_body(self) -> bool {
        matches!(self, MessageType::PutChunk | MessageType::Chunk)
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PUTCHUNK" => Ok(MessageType::PutChunk),
            "STORED" => Ok(MessageType::Stored),
            "GETCHUNK" => Ok(MessageType::GetChunk),
            "CHUNK" => Ok(MessageType::Chunk),
            "DELETE" => Ok(MessageType::Delete),
            "REMOVED" => Ok(MessageType::Removed),
            "ALIVE" => Ok(MessageType::Alive),
            _ => Err(Error::UnknownMessageType(s.to_owned())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional fields are `Some` exactly when the message type carries them;
/// the constructors and the decoder both enforce this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub version: String,
    pub sender: PeerId,
    pub file_id: Option<FileId>,
    pub chunk_no: Option<u32>,
    pub replication_degree: Option<u8>,
    pub body: Vec<u8>,
}

impl Message {
    fn new(kind: MessageType, version: &str, sender: PeerId) -> Self {
        Message {
            kind,
            version: version.to_owned(),
            sender,
            file_id: None,
            chunk_no: None,
            replication_degree: None,
            body: vec![],
        }
    }

    pub fn put_chunk(
        version: &str,
        sender: PeerId,
        key: ChunkKey,
        replication_degree: u8,
        body: Vec<u8>,
    ) -> Self {
        Message {
            file_id: Some(key.file_id),
            chunk_no: Some(key.chunk_no),
            replication_degree: Some(replication_degree),
            body,
            ..Message::new(MessageType::PutChunk, version, sender)
        }
    }

    pub fn stored(version: &str, sender: PeerId, key: ChunkKey) -> Self {
        Message::for_chunk(MessageType::Stored, version, sender, key)
    }

    pub fn get_chunk(version: &str, sender: PeerId, key: ChunkKey) -> Self {
        Message::for_chunk(MessageType::GetChunk, version, sender, key)
    }

    pub fn chunk(version: &str, sender: PeerId, key: ChunkKey, body: Vec<u8>) -> Self {
        Message {
            body,
            ..Message::for_chunk(MessageType::Chunk, version, sender, key)
        }
    }

    pub fn removed(version: &str, sender: PeerId, key: ChunkKey) -> Self {
        Message::for_chunk(MessageType::Removed, version, sender, key)
    }

    pub fn delete(version: &str, sender: PeerId, file_id: FileId) -> Self {
        Message {
            file_id: Some(file_id),
            ..Message::new(MessageType::Delete, version, sender)
        }
    }

    pub fn alive(version: &str, sender: PeerId) -> Self {
        Message::new(MessageType::Alive, version, sender)
    }

    fn for_chunk(kind: MessageType, version: &str, sender: PeerId, key: ChunkKey) -> Self {
        Message {
            file_id: Some(key.file_id),
            chunk_no: Some(key.chunk_no),
            ..Message::new(kind, version, sender)
        }
    }

    pub fn file_id(&self) -> Result<FileId> {
        self.file_id.ok_or(Error::MissingField("fileId", self.kind))
    }

    pub fn chunk_key(&self) -> Result<ChunkKey> {
        let file_id = self.file_id()?;
        let chunk_no = self
            .chunk_no
            .ok_or(Error::MissingField("chunkNo", self.kind))?;
        Ok(ChunkKey::new(file_id, chunk_no))
    }

    pub fn replication_degree(&self) -> Result<u8> {
        self.replication_degree
            .ok_or(Error::MissingField("replicationDegree", self.kind))
    }

    pub fn is_enhanced(&self) -> bool {
        self.version == ENHANCED_VERSION
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from peer {}", self.kind, self.sender)?;
        match (self.file_id, self.chunk_no) {
            (Some(file_id), Some(chunk_no)) => write!(f, " for {file_id}#{chunk_no}"),
            (Some(file_id), None) => write!(f, " for {file_id}"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChunkKey {
    pub file_id: FileId,
    pub chunk_no: u32,
}

impl ChunkKey {
    pub fn new(file_id: FileId, chunk_no: u32) -> Self {
        ChunkKey { file_id, chunk_no }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file_id, self.chunk_no)
    }
}
