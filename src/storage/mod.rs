mod budget;
mod chunks;


pub use self::{
    budget::{StorageAccountant, StorageBudget},
    chunks::{ChunkStore, SaveState},
};
