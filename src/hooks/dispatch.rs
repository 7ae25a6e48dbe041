//! Delivery of signals to the hook registry.
//!
//! `Inline` awaits each hook on the task that produced the signal (the
//! listener). A hook that awaits a correlated send in this mode stalls the
//! listener: the response cannot be read until the hook returns, so the nested
//! send runs into its timeout and later blocks are delivered late.
//!
//! `Queued` hands signals to a single worker task. Hooks still run one at a
//! time in wire order, but the listener keeps reading, so a hook can await a
//! correlated send. Correlation waiters may then be resolved before the action
//! hook for the same response has run.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use super::{HookRegistry, Signal};
use crate::config::HookDispatch;

/// Routes signals to hooks according to the configured [`HookDispatch`].
#[derive(Clone)]
pub enum HookDispatcher {
    Inline(Arc<HookRegistry>),
    Queued(mpsc::UnboundedSender<Signal>),
}

impl HookDispatcher {
    /// Create a dispatcher. In queued mode this spawns the hook worker, which
    /// stops once every clone of the dispatcher is dropped.
    pub fn new(mode: HookDispatch, registry: Arc<HookRegistry>) -> (Self, Option<JoinHandle<()>>) {
        match mode {
            HookDispatch::Inline => (HookDispatcher::Inline(registry), None),
            HookDispatch::Queued => {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = tokio::spawn(hook_worker(rx, registry).with_current_subscriber());
                (HookDispatcher::Queued(tx), Some(worker))
            }
        }
    }

    /// Deliver a signal.
    pub async fn dispatch(&self, signal: Signal) {
        match self {
            HookDispatcher::Inline(registry) => registry.invoke(signal).await,
            HookDispatcher::Queued(tx) => {
                if tx.send(signal).is_err() {
                    tracing::warn!("hook worker stopped, signal dropped");
                }
            }
        }
    }
}

async fn hook_worker(mut rx: mpsc::UnboundedReceiver<Signal>, registry: Arc<HookRegistry>) {
    while let Some(signal) = rx.recv().await {
        registry.invoke(signal).await;
    }
    tracing::debug!("hook worker stopped");
}
