//! Hook module - lifecycle callbacks and their dispatch.
//!
//! Provides:
//! - [`HookRegistry`] - one callback slot per [`HookKind`]
//! - [`HookDispatcher`] - inline or queued delivery of [`Signal`]s
//!
//! # Example
//!
//! ```ignore
//! use amiwire_client::hooks::{HookKind, Signal};
//!
//! manager.register_hook(HookKind::Disconnect, |_signal: Signal| async move {
//!     tracing::warn!("lost the manager connection");
//! });
//! ```

mod dispatch;
mod registry;

pub use dispatch::HookDispatcher;
pub use registry::{BoxFuture, Hook, HookKind, HookRegistry, Signal};
