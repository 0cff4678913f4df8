use std::{io, path::PathBuf};

use log::debug;
use tokio::fs;

use crate::error::StoreErr;

/// A directory of named binary blobs.
#[derive(Debug)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Creates a new `BlobStore` rooted at `dir`, creating it if needed.
    pub async fn open(dir: PathBuf) -> Result<Self, StoreErr> {
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Reads the blob stored under `key`.
    ///
    /// # Returns
    /// The blob, `None` if there is none or an error if `key` is invalid or the read fails.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreErr> {
        let path = self.dir.join(check_key(key)?);

        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores `bytes` under `key`, replacing any previous blob.
    ///
    /// Readers either see the previous blob or the new one, never a partial write.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreErr> {
        let key = check_key(key)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, self.dir.join(key)).await?;

        debug!(key = key, bytes = bytes.len(); "stored blob");
        Ok(())
    }
}

/// Makes sure `key` names a file directly inside the store.
pub(crate) fn check_key(key: &str) -> Result<&str, StoreErr> {
    let invalid = key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\');

    if invalid {
        return Err(StoreErr::InvalidKey(key.to_string()));
    }

    Ok(key)
}
