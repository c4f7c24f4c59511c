//! Write side of a relayed connection

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Owned write half of a client or backend connection
///
/// Every write is flushed before returning so bytes never sit in a buffer
/// while the other direction waits on them. `close` shuts the stream down
/// at most once; later calls do nothing.
pub struct Link<W> {
    name: &'static str,
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> Link<W> {
    /// Wrap a writer; `name` is used in log output
    pub fn new(name: &'static str, writer: W) -> Self {
        Self {
            name,
            writer,
            closed: false,
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write all bytes and flush
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} link is closed", self.name),
            ));
        }
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    /// Shut the connection down; idempotent and never fails
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.writer.shutdown().await {
            debug!(link = self.name, error = %e, "Shutdown failed");
        }
    }
}
