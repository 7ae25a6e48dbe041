//! Hook registry: at most one callback per lifecycle signal.
//!
//! # Example
//!
//! ```ignore
//! use amiwire_client::hooks::{HookKind, HookRegistry, Signal};
//!
//! let registry = HookRegistry::new();
//!
//! registry.register(HookKind::Event, |signal: Signal| async move {
//!     if let Signal::Event(block) = signal {
//!         println!("event: {:?}", block.event());
//!     }
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::ManagerError;
use crate::protocol::Block;

/// Boxed future returned by hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle signals a hook can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// An event block was received.
    Event,
    /// A response to an action was received.
    Action,
    /// The connection was lost or closed.
    Disconnect,
    /// The connection was re-established by the reconnect loop.
    Reconnect,
}

impl HookKind {
    pub const ALL: [HookKind; 4] = [
        HookKind::Event,
        HookKind::Action,
        HookKind::Disconnect,
        HookKind::Reconnect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Event => "event",
            HookKind::Action => "action",
            HookKind::Disconnect => "disconnect",
            HookKind::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ManagerError::InvalidHookSignal(s.to_string()))
    }
}

/// Payload handed to a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Event(Block),
    Action(Block),
    Disconnect,
    Reconnect,
}

impl Signal {
    /// Hook slot this signal is delivered to.
    pub fn kind(&self) -> HookKind {
        match self {
            Signal::Event(_) => HookKind::Event,
            Signal::Action(_) => HookKind::Action,
            Signal::Disconnect => HookKind::Disconnect,
            Signal::Reconnect => HookKind::Reconnect,
        }
    }

    /// Block carried by event and action signals.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Signal::Event(b) | Signal::Action(b) => Some(b),
            _ => None,
        }
    }
}

/// Trait for hook callbacks.
///
/// Implemented for every `Fn(Signal) -> impl Future<Output = ()>` closure.
pub trait Hook: Send + Sync + 'static {
    fn call(&self, signal: Signal) -> BoxFuture<'static, ()>;
}

impl<F, Fut> Hook for F
where
    F: Fn(Signal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, signal: Signal) -> BoxFuture<'static, ()> {
        Box::pin((self)(signal))
    }
}

/// Registry mapping each signal to its callback.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<HookKind, Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, replacing any previous one for the same signal.
    pub fn register<H: Hook>(&self, kind: HookKind, hook: H) {
        self.register_arc(kind, Arc::new(hook));
    }

    pub fn register_arc(&self, kind: HookKind, hook: Arc<dyn Hook>) {
        tracing::debug!(%kind, "register hook");
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, hook);
    }

    /// Register a hook by signal name.
    pub fn register_named<H: Hook>(&self, name: &str, hook: H) -> crate::Result<()> {
        let kind: HookKind = name.parse()?;
        self.register(kind, hook);
        Ok(())
    }

    /// Remove the hook for a signal. Returns `true` if one was registered.
    pub fn unregister(&self, kind: HookKind) -> bool {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&kind)
            .is_some()
    }

    pub fn get(&self, kind: HookKind) -> Option<Arc<dyn Hook>> {
        self.hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }

    pub fn is_registered(&self, kind: HookKind) -> bool {
        self.get(kind).is_some()
    }

    /// Run the hook for this signal, if any, to completion.
    ///
    /// The registry lock is released before the hook runs, so a hook may
    /// register or unregister hooks itself.
    pub async fn invoke(&self, signal: Signal) {
        let Some(hook) = self.get(signal.kind()) else {
            return;
        };
        hook.call(signal).await;
    }
}
