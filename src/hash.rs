use std::{fmt, path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const HEX_LENGTH: usize = blake3::OUT_LEN * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(blake3::Hash);

impl FileId {
    /// Derives the ID from the path and the metadata that changes whenever
    /// the file's contents do, so an edited file gets a fresh ID.
    pub fn derive(path: &Path, size: u64, modified: DateTime<Utc>) -> Self {
        let mut hasher = blake3::Hasher::new();

        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(&size.to_le_bytes());
        let timestamp = modified.format("%+").to_string();
        hasher.update(timestamp.as_bytes());

        FileId(hasher.finalize())
    }

    pub fn from_bytes(bytes: [u8; blake3::OUT_LEN]) -> Self {
        FileId(blake3::Hash::from_bytes(bytes))
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != HEX_LENGTH {
            return Err(Error::InvalidFileId(s.to_owned()));
        }

        blake3::Hash::from_hex(s)
            .map(FileId)
            .map_err(|_| Error::InvalidFileId(s.to_owned()))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}
