//! Incremental JSONL stream tailer.
//!
//! Reads records appended to a stream file since the last read. The reader
//! index refreshes through a tailer, which is what bounds visibility lag to
//! the poll interval.

use std::marker::PhantomData;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::StoreError;

/// Byte-offset tailer over an append-only JSONL file.
///
/// Reads only lines appended since the last call. A missing file is treated
/// as an empty stream (the store may not have received its first write yet).
#[derive(Debug)]
pub struct JsonlTailer<T> {
    path: PathBuf,
    offset: u64,
    _record: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlTailer<T> {
    /// Create a tailer starting at the beginning of the stream.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            _record: PhantomData,
        }
    }

    /// Current byte offset into the stream.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read records appended since the last read.
    ///
    /// Malformed lines are skipped with a warning; the stream is append-only
    /// so a malformed line can never become valid later. If the file shrank
    /// (manual truncation), the offset resets and the whole stream is
    /// re-read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on read failures other than a missing
    /// file.
    pub async fn read_new(&mut self) -> Result<Vec<T>, StoreError> {
        let file = match File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let file_len = file.metadata().await?.len();
        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "Stream file shrank, re-reading from start"
            );
            self.offset = 0;
        }
        if file_len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = file;
        file.seek(std::io::SeekFrom::Start(self.offset)).await?;

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            self.offset += bytes_read as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Skipping malformed stream line"
                    );
                }
            }
        }

        Ok(records)
    }
}
