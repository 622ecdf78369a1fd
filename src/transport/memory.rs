use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    error::{Error, Result},
    peer::PeerId,
};

use super::{Channel, Intake, Transport};

#[derive(Debug, Clone, Default)]
pub struct MemoryGroup {
    members: Arc<DashMap<PeerId, Intake>>,
}

impl MemoryGroup {
    pub fn new() -> Self {
        MemoryGroup::default()
    }

    pub fn transport(&self, id: PeerId) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport {
            id,
            group: self.clone(),
        })
    }

    pub fn join(&self, id: PeerId, intake: Intake) {
        self.members.insert(id, intake);
    }

    pub fn leave(&self, id: PeerId) {
        self.members.remove(&id);
    }

    fn intakes(&self) -> Vec<Intake> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: PeerId,
    group: MemoryGroup,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, _channel: Channel, bytes: Vec<u8>) -> Result<()> {
        if !self.group.members.contains_key(&self.id) {
            return Ok(());
        }

        for intake in self.group.intakes() {
            // A peer that shut down has closed its intake.
            let _ = intake.send(bytes.clone()).await;
        }
        Ok(())
    }

    async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<()> {
        let intake = self
            .group
            .members
            .get(&peer)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownPeer(peer))?;
        intake.send(bytes).await?;
        Ok(())
    }
}
