use std::{io, path::Path};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, task::spawn_blocking};

use crate::error::Result;

pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(value)?;
    Ok(bytes)
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let value = bincode::deserialize(bytes)?;
    Ok(value)
}

pub async fn save<T: Serialize + Send + 'static>(path: &Path, value: T) -> Result<()> {
    let bytes = spawn_blocking(move || serialize(&value)).await??;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn load<T: DeserializeOwned + Send + 'static>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let value = spawn_blocking(move || deserialize(&bytes)).await??;
    Ok(Some(value))
}
