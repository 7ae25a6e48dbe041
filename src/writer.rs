//! Dedicated writer task for the socket's write half.
//!
//! Every action is encoded into a single buffer and queued on an mpsc
//! channel. One task owns the write half and drains the queue, so the lines of
//! two actions can never interleave on the wire, whichever task sent them.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundAction> ─► Writer Task ─► Socket
//! Listener ─┘
//! ```
//!
//! Ready actions are batched into a single vectored write.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::error::{ManagerError, Result};
use crate::protocol::{encode_action, Action};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum actions to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// An encoded action ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundAction {
    /// Action name, for logging.
    pub name: String,
    /// All field lines plus the terminating blank line.
    pub payload: Bytes,
}

impl OutboundAction {
    /// Encode an action.
    pub fn encode(action: &Action) -> Self {
        Self {
            name: action.name().to_string(),
            payload: encode_action(action),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the action queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing actions on the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundAction>,
}

impl WriterHandle {
    /// Queue an action. Fails once the writer task has stopped.
    pub async fn send(&self, action: OutboundAction) -> Result<()> {
        tracing::debug!(action = %action.name, bytes = action.size(), "queue action");
        self.tx
            .send(action)
            .await
            .map_err(|_| ManagerError::ConnectionClosed)
    }

    /// `true` once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing actions.
///
/// The task ends cleanly when every handle is dropped, or with an error when
/// a write fails. Either way the write half is dropped, which shuts down the
/// sending direction of the socket.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer).with_current_subscriber());
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundAction>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(a) => a,
            None => {
                tracing::debug!("writer channel closed");
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(action) => batch.push(action),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::warn!("write failed, stopping writer: {}", e);
            return Err(e);
        }
    }
}

/// Write a batch of actions using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundAction]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|a| a.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(ManagerError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundAction], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for action in batch {
        let end = offset + action.size();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&action.payload[start..]));
        }
        offset = end;
    }

    slices
}
