#[cfg(test)]
pub mod memory;
mod udp;

use std::fmt::{self, Debug};

use async_trait::async_trait;

use crate::{error::Result, message::MessageType, peer::PeerId};

pub use self::udp::{GroupAddrs, UdpListener, UdpTransport};

pub type Intake = async_channel::Sender<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Control,
    Backup,
    Restore,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Control, Channel::Backup, Channel::Restore];

    pub fn for_message(kind: MessageType) -> Channel {
        match kind {
            MessageType::PutChunk => Channel::Backup,
            MessageType::Chunk => Channel::Restore,
            MessageType::Stored
            | MessageType::GetChunk
            | MessageType::Delete
            | MessageType::Removed
            | MessageType::Alive => Channel::Control,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Control => "control",
            Channel::Backup => "backup",
            Channel::Restore => "restore",
        };
        write!(f, "{name}")
    }
}

/// Outbound half of the group transport.
///
/// `send` is best effort: messages may be lost, duplicated or reordered.
/// `send_to` is an ordered, reliable stream to a single peer.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, channel: Channel, bytes: Vec<u8>) -> Result<()>;

    async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<()>;
}
