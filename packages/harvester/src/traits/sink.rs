//! Log sink trait: where append-log lines physically go.

use async_trait::async_trait;
use std::io;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Byte sink behind a [`crate::store::PersistenceLog`].
///
/// Each call is one step of the append protocol; the log decides when to
/// retry and when a failure is fatal.
#[async_trait]
pub trait LogSink: Send {
    /// Write one complete line (newline included) and flush it.
    async fn write_line(&mut self, line: &[u8]) -> io::Result<()>;

    /// Force written data to stable storage.
    async fn sync(&mut self) -> io::Result<()>;

    /// Flush and sync before the sink is dropped.
    async fn finish(&mut self) -> io::Result<()>;
}

#[async_trait]
impl LogSink for File {
    async fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write_all(line).await?;
        self.flush().await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.sync_data().await
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.sync_all().await
    }
}
