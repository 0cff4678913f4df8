use std::{io, path::PathBuf};

use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

use crate::error::StoreErr;

#[derive(Serialize, Deserialize)]
struct Entry<T> {
    id: u64,
    #[serde(flatten)]
    record: T,
}

#[derive(Deserialize)]
struct EntryId {
    id: u64,
}

/// An append only log of json records, one per line, each with an auto incremented `id`.
///
/// A record is committed once its trailing newline is written. A trailing line without one
/// is an interrupted append: reads skip it and the next append truncates it.
#[derive(Debug)]
pub struct JsonLog {
    path: PathBuf,
    last_id: Mutex<Option<u64>>,
}

struct Committed {
    lines: Vec<String>,
    len: u64,
    torn: bool,
}

impl JsonLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_id: Mutex::new(None),
        }
    }

    /// Appends `record` to the log.
    ///
    /// # Returns
    /// The id assigned to the record.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<u64, StoreErr> {
        let mut last_id = self.last_id.lock().await;

        let last = match *last_id {
            Some(last) => last,
            None => self.recover().await?,
        };

        let id = last + 1;
        let mut line = serde_json::to_vec(&Entry { id, record })?;
        line.push(b'\n');

        // A failed write may leave a partial line, the next append recovers from disk.
        *last_id = None;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        *last_id = Some(id);
        Ok(id)
    }

    /// Reads every committed record in insertion order.
    pub async fn entries<T: DeserializeOwned>(&self) -> Result<Vec<(u64, T)>, StoreErr> {
        let _guard = self.last_id.lock().await;

        self.read_committed()
            .await?
            .lines
            .iter()
            .map(|line| -> Result<(u64, T), StoreErr> {
                let Entry { id, record } = serde_json::from_str(line)?;
                Ok((id, record))
            })
            .collect()
    }

    /// Drops an interrupted append, if any, and finds the last committed id.
    async fn recover(&self) -> Result<u64, StoreErr> {
        let committed = self.read_committed().await?;

        if committed.torn {
            warn!(len = committed.len; "truncating an interrupted log append");
            let file = fs::OpenOptions::new().write(true).open(&self.path).await?;
            file.set_len(committed.len).await?;
        }

        let mut last = 0;
        for line in &committed.lines {
            let EntryId { id } = serde_json::from_str(line)?;
            last = last.max(id);
        }

        Ok(last)
    }

    async fn read_committed(&self) -> Result<Committed, StoreErr> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let len = raw.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        let lines = String::from_utf8_lossy(&raw[..len])
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Committed {
            lines,
            len: len as u64,
            torn: len < raw.len(),
        })
    }
}
