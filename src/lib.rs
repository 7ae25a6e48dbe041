//! # amiwire-client
//!
//! Async client for line-oriented telephony manager interfaces.
//!
//! The server speaks blocks of `Key: Value` lines terminated by a blank line.
//! Clients send actions; the server answers with responses and pushes events
//! at any time on the same connection.
//!
//! ## Architecture
//!
//! - **Writer task**: owns the socket's write half, one action at a time
//! - **Listener task**: reads blocks, runs hooks, resolves correlated sends
//! - **Reconnect loop**: runs on the listener task after the connection drops
//!
//! ## Example
//!
//! ```ignore
//! use amiwire_client::{Action, HookKind, Manager, Signal};
//!
//! #[tokio::main]
//! async fn main() -> amiwire_client::Result<()> {
//!     let manager = Manager::builder("admin", "s3cret")
//!         .host("pbx.local")
//!         .build()
//!         .await?;
//!
//!     manager.register_hook(HookKind::Event, |signal: Signal| async move {
//!         if let Some(block) = signal.block() {
//!             println!("{:?}", block.event());
//!         }
//!     });
//!     manager.connect(true).await?;
//!
//!     let reply = manager.ping_await(Action::default(), None).await;
//!     println!("ping: {}", reply.is_success());
//!
//!     manager.join().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod correlation;
pub mod error;
pub mod hooks;
pub mod protocol;
pub mod transport;
pub mod writer;

mod listener;
mod manager;

pub use command::Command;
pub use config::{HookDispatch, ManagerConfig, ProtocolVersion};
pub use error::{ManagerError, Result};
pub use hooks::{Hook, HookKind, Signal};
pub use manager::{ActionReply, ConnectionInfo, ConnectionState, Manager, ManagerBuilder};
pub use protocol::{Action, Block, FieldValue};
