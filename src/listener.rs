//! Listener: owns the read side of one connection.
//!
//! Reads CRLF lines, assembles blocks, and dispatches each completed block
//! in the order its terminating blank line was read:
//! - events go to the event hook (after legacy normalization when enabled)
//! - responses go to the action hook, then resolve the matching correlation
//!
//! The loop ends on EOF, read error, or a close request from
//! `Manager::disconnect`. It never retries; it hands over to the manager's
//! connection-lost procedure exactly once.

use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::oneshot;

use crate::hooks::{BoxFuture, Signal};
use crate::manager::Inner;
use crate::protocol::{Block, BlockKind, BlockParser, LINE_TERMINATOR, RESPONSE_GOODBYE};
use crate::transport::LineReader;

/// Everything the listener task owns.
pub(crate) struct ListenerContext {
    pub(crate) inner: Arc<Inner>,
    pub(crate) lines: LineReader<OwnedReadHalf>,
    pub(crate) close_rx: oneshot::Receiver<()>,
    pub(crate) generation: u64,
}

/// Run the listener until the connection ends, then the connection-lost
/// procedure (which may reconnect and spawn the next listener).
pub(crate) fn run_listener(ctx: ListenerContext) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let ListenerContext {
            inner,
            mut lines,
            mut close_rx,
            generation,
        } = ctx;
        let legacy = inner.config.protocol_version.is_legacy();
        let mut parser = BlockParser::new();
        let mut block = Block::new();

        tracing::debug!(generation, legacy, "listener started");
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = &mut close_rx => {
                    tracing::debug!(generation, "close requested");
                    break;
                }
            };

            match line {
                Ok(Some(line)) => {
                    tracing::trace!(line = %line.trim_end(), "read");
                    if line == LINE_TERMINATOR {
                        dispatch_block(&inner, std::mem::take(&mut block), legacy).await;
                    } else if let Some(field) = parser.feed(&line) {
                        block.insert(field.key, field.value);
                    }
                }
                Ok(None) => {
                    tracing::info!(generation, "connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::warn!(generation, "read failed, closing connection: {}", e);
                    break;
                }
            }
        }

        drop(lines);
        inner.connection_lost(generation).await;
    })
}

async fn dispatch_block(inner: &Inner, mut block: Block, legacy: bool) {
    match block.kind() {
        BlockKind::Event => {
            if legacy && block.normalize_legacy_user_event() {
                tracing::trace!("normalized legacy user event");
            }
            inner.dispatcher.dispatch(Signal::Event(block)).await;
        }
        BlockKind::Response => {
            if block.response() == Some(RESPONSE_GOODBYE) {
                tracing::info!("server acknowledged logoff");
            }
            let action_id = block.action_id().map(str::to_string);
            inner.dispatcher.dispatch(Signal::Action(block.clone())).await;

            if let Some(action_id) = action_id {
                if !inner.correlations.resolve(&action_id, block) {
                    tracing::trace!(%action_id, "response without waiter");
                }
            }
        }
    }
}
