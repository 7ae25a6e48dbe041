//! Manager builder, connection lifecycle and send path.
//!
//! The [`ManagerBuilder`] provides a fluent API for configuring the
//! connection. The [`Manager`] manages the lifecycle:
//! 1. Open the TCP socket
//! 2. Log in, reading the acknowledgment directly on the caller's task
//! 3. Spawn the listener task, which dispatches events and responses
//! 4. On connection loss, fire the disconnect hook and reconnect if enabled
//!
//! # Example
//!
//! ```ignore
//! use amiwire_client::{Action, HookKind, Manager, Signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Manager::builder("admin", "s3cret")
//!         .host("pbx.local")
//!         .build()
//!         .await?;
//!
//!     manager.register_hook(HookKind::Event, |signal: Signal| async move {
//!         println!("{:?}", signal.block());
//!     });
//!     manager.connect(true).await?;
//!
//!     let reply = manager.send_action_await(Action::new("ping"), None).await;
//!     assert!(reply.is_success());
//!
//!     manager.join().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::instrument::{WithDispatch, WithSubscriber};

use crate::config::{HookDispatch, ManagerConfig, ProtocolVersion};
use crate::correlation::CorrelationTable;
use crate::error::{ManagerError, Result};
use crate::hooks::{Hook, HookDispatcher, HookKind, HookRegistry, Signal};
use crate::listener::{run_listener, ListenerContext};
use crate::protocol::{
    expected_response, Action, Block, BlockParser, LINE_TERMINATOR, RESPONSE_SUCCESS,
};
use crate::transport::{open_stream, LineReader};
use crate::writer::{spawn_writer_task, OutboundAction, WriterConfig, WriterHandle};

/// Lifecycle state of the manager connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Disconnecting,
}

/// Result of a correlated send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReply {
    /// The response carried a non-empty `value` field.
    Value(String),
    /// Whether the response matched the expected marker. `false` when no
    /// response arrived in time or the action could not be sent.
    Flag(bool),
}

impl ActionReply {
    fn from_response(block: &Block, expected: &str) -> Self {
        match block.get("value") {
            Some(value) if !value.is_empty() => ActionReply::Value(value.to_string()),
            _ => ActionReply::Flag(block.response() == Some(expected)),
        }
    }

    /// `true` for a value or a positive flag.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionReply::Value(_) | ActionReply::Flag(true))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            ActionReply::Value(v) => Some(v),
            ActionReply::Flag(_) => None,
        }
    }
}

/// Addresses of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    /// Increases with every successful connection.
    pub generation: u64,
}

/// Write side of a live connection.
struct Connection {
    info: ConnectionInfo,
    writer: WriterHandle,
    close_tx: oneshot::Sender<()>,
}

/// Authenticated socket, before the listener takes over the read side.
struct LoginSession {
    lines: LineReader<OwnedReadHalf>,
    writer: WriterHandle,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

/// Builder for configuring and creating a [`Manager`].
pub struct ManagerBuilder {
    config: ManagerConfig,
    log_dispatch: Option<tracing::Dispatch>,
}

impl ManagerBuilder {
    /// Create a builder from a full configuration.
    pub fn from_config(config: ManagerConfig) -> Self {
        Self {
            config,
            log_dispatch: None,
        }
    }

    /// Host name where the server runs. Default: `localhost`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Manager port. Default: 5038.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Pause between two reconnection attempts. Default: 1 second.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Event mask sent at login. Default: `on`.
    pub fn event_mask(mut self, mask: impl Into<String>) -> Self {
        self.config.event_mask = mask.into();
        self
    }

    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Connect (with reconnection enabled) as part of [`build`](Self::build).
    pub fn connect_immediately(mut self, connect: bool) -> Self {
        self.config.connect_immediately = connect;
        self
    }

    /// Bound on the login handshake. Default: 10 seconds.
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.config.login_timeout = timeout;
        self
    }

    /// Timeout of correlated sends that do not pass one. Default: 10 seconds.
    pub fn default_reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_reply_timeout = timeout;
        self
    }

    pub fn hook_dispatch(mut self, dispatch: HookDispatch) -> Self {
        self.config.hook_dispatch = dispatch;
        self
    }

    /// Writer queue capacity. Default: 1024.
    pub fn writer_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_channel_capacity = capacity;
        self
    }

    /// Send this manager's logs to `dispatch` instead of the caller's
    /// current subscriber.
    pub fn log_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.log_dispatch = Some(dispatch);
        self
    }

    /// Build the manager, connecting first if `connect_immediately` is set.
    pub async fn build(self) -> Result<Manager> {
        let log_dispatch = self.log_dispatch.clone();
        let build = async move {
            let registry = Arc::new(HookRegistry::new());
            let (dispatcher, _worker) =
                HookDispatcher::new(self.config.hook_dispatch, registry.clone());
            let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
            let connect_immediately = self.config.connect_immediately;

            let manager = Manager {
                inner: Arc::new(Inner {
                    config: self.config,
                    hooks: registry,
                    dispatcher,
                    correlations: CorrelationTable::new(),
                    state_tx,
                    should_reconnect: AtomicBool::new(false),
                    stop_epoch: AtomicU64::new(0),
                    connection: Mutex::new(None),
                    listener_task: Mutex::new(None),
                    connect_lock: tokio::sync::Mutex::new(()),
                    generation: AtomicU64::new(0),
                    log_dispatch: self.log_dispatch,
                }),
            };

            if connect_immediately {
                manager.inner.connect(true).await?;
            }
            Ok(manager)
        };

        match log_dispatch {
            Some(dispatch) => build.with_subscriber(dispatch).await,
            None => build.await,
        }
    }
}

/// Client for one manager interface connection.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    /// Create a builder with the given credentials.
    pub fn builder(username: impl Into<String>, secret: impl Into<String>) -> ManagerBuilder {
        ManagerBuilder::from_config(ManagerConfig::new(username, secret))
    }

    /// Create a builder from a configuration (e.g. loaded from JSON).
    pub fn from_config(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::from_config(config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Connect, log in, and start listening.
    ///
    /// With `should_reconnect`, a lost connection is re-established every
    /// `reconnect_interval` until it succeeds. Calling this while connected
    /// does nothing.
    pub async fn connect(&self, should_reconnect: bool) -> Result<()> {
        self.inner
            .instrument(self.inner.connect(should_reconnect))
            .await
    }

    /// Close the connection without sending a logoff, and disable
    /// reconnection. A reconnect attempt still logging in is abandoned.
    ///
    /// Fails with [`ManagerError::NotConnected`] when there is no open
    /// connection. Correlated sends still waiting run into their timeout.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.disconnect()
    }

    /// `true` if the last known state is [`ConnectionState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Wait until the manager reaches `state`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == state)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Addresses of the open connection, if any.
    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.inner.connection().as_ref().map(|c| c.info)
    }

    /// Register (or replace) the hook for a signal.
    pub fn register_hook<H: Hook>(&self, kind: HookKind, hook: H) {
        self.inner.hooks.register(kind, hook);
    }

    /// Register a hook by signal name (`event`, `action`, `disconnect`,
    /// `reconnect`).
    pub fn register_hook_named<H: Hook>(&self, name: &str, hook: H) -> Result<()> {
        self.inner.hooks.register_named(name, hook)
    }

    /// Remove the hook for a signal. Returns `true` if one was registered.
    pub fn unregister_hook(&self, kind: HookKind) -> bool {
        self.inner.hooks.unregister(kind)
    }

    /// Send an action without waiting for its response.
    ///
    /// Fails with [`ManagerError::NotConnected`] when there is no open
    /// connection and [`ManagerError::ConnectionClosed`] when the socket is
    /// already gone. The failure is returned to the caller rather than only
    /// logged; ignore the result to get log-and-continue behaviour.
    pub async fn send_action(&self, action: Action) -> Result<()> {
        self.inner.instrument(self.inner.send(&action)).await
    }

    /// Send an action and wait up to `timeout` for the response carrying
    /// its `actionid`.
    ///
    /// An `actionid` is generated when the action has none. The default
    /// timeout is the configured `default_reply_timeout`. Returns the
    /// response's `value` if it has one, else whether its `response` matched
    /// (`Pong` for `ping`, `Success` otherwise). Failures to send are logged
    /// and reported as `Flag(false)`.
    ///
    /// Hooks run on the listener task by default: awaiting this from inside
    /// a hook holds up event delivery until the reply arrives or times out,
    /// and with [`HookDispatch::Inline`] the reply cannot be read before the
    /// hook returns. Use [`HookDispatch::Queued`] for hooks that send
    /// correlated actions.
    pub async fn send_action_await(&self, action: Action, timeout: Option<Duration>) -> ActionReply {
        let timeout = timeout.unwrap_or(self.inner.config.default_reply_timeout);
        self.inner
            .instrument(self.inner.send_await(action, timeout))
            .await
    }

    /// Wait until no listener task is running, following reconnections.
    pub async fn join(&self) {
        loop {
            let task = self.inner.listener_task().take();
            match task {
                Some(task) => {
                    if let Err(e) = task.await {
                        tracing::error!("listener task failed: {}", e);
                    }
                }
                None => return,
            }
        }
    }

    pub(crate) fn disable_reconnect(&self) {
        self.inner.disable_reconnect();
    }
}

pub(crate) struct Inner {
    pub(crate) config: ManagerConfig,
    hooks: Arc<HookRegistry>,
    pub(crate) dispatcher: HookDispatcher,
    pub(crate) correlations: CorrelationTable,
    state_tx: watch::Sender<ConnectionState>,
    should_reconnect: AtomicBool,
    /// Bumped by every request to stop reconnecting. A connection attempt
    /// that started under an older value is abandoned after login.
    stop_epoch: AtomicU64,
    connection: Mutex<Option<Connection>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes connection attempts (callers and the reconnect loop).
    connect_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    log_dispatch: Option<tracing::Dispatch>,
}

impl Inner {
    fn instrument<F: Future>(&self, fut: F) -> WithDispatch<F> {
        match &self.log_dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()),
            None => fut.with_current_subscriber(),
        }
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listener_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener_task.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "state change");
        }
    }

    fn writer(&self) -> Result<WriterHandle> {
        self.connection()
            .as_ref()
            .map(|c| c.writer.clone())
            .ok_or(ManagerError::NotConnected)
    }

    async fn connect(self: &Arc<Self>, should_reconnect: bool) -> Result<()> {
        let epoch = self.stop_epoch.load(Ordering::SeqCst);
        self.connect_at(should_reconnect, epoch).await
    }

    /// Connect unless reconnection is disabled (by `disconnect` or `logoff`)
    /// after `epoch` was read.
    async fn connect_at(self: &Arc<Self>, should_reconnect: bool, epoch: u64) -> Result<()> {
        let _guard = self.connect_lock.lock().await;

        if self.state() == ConnectionState::Connected {
            tracing::debug!("already connected");
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let session = match self.open_and_login().await {
            Ok(session) => session,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let peer_addr = session.peer_addr;
        let (close_tx, close_rx) = oneshot::channel();
        let generation = {
            let mut connection = self.connection();
            if self.stop_epoch.load(Ordering::SeqCst) != epoch {
                self.set_state(ConnectionState::Disconnected);
                tracing::info!(
                    %peer_addr,
                    "disconnect requested during login, dropping connection"
                );
                return Err(ManagerError::NotConnected);
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *connection = Some(Connection {
                info: ConnectionInfo {
                    local_addr: session.local_addr,
                    peer_addr,
                    generation,
                },
                writer: session.writer,
                close_tx,
            });
            self.should_reconnect.store(should_reconnect, Ordering::SeqCst);
            self.set_state(ConnectionState::Connected);
            generation
        };
        tracing::info!(%peer_addr, generation, "connected");

        let listener = run_listener(ListenerContext {
            inner: self.clone(),
            lines: session.lines,
            close_rx,
            generation,
        });
        *self.listener_task() = Some(tokio::spawn(listener.with_current_subscriber()));
        Ok(())
    }

    /// Open the socket and run the login handshake.
    async fn open_and_login(&self) -> Result<LoginSession> {
        let config = &self.config;
        let stream = open_stream(&config.host, config.port).await?;
        let local_addr = stream.local_addr();
        let peer_addr = stream.peer_addr();
        let (mut lines, write_half) = stream.into_split();

        self.set_state(ConnectionState::Authenticating);
        let (writer, _writer_task) = spawn_writer_task(
            write_half,
            WriterConfig {
                channel_capacity: config.writer_channel_capacity,
            },
        );

        let login = Action::new("login")
            .field("username", config.username.as_str())
            .field("secret", config.secret.as_str())
            .field("events", config.event_mask.as_str());
        writer.send(OutboundAction::encode(&login)).await?;

        let ack = tokio::time::timeout(config.login_timeout, read_block(&mut lines))
            .await
            .map_err(|_| ManagerError::NoLoginResponse)??;
        tracing::debug!(response = ?ack.response(), "login acknowledgment");

        if ack.response() != Some(RESPONSE_SUCCESS) {
            let message = ack.message().unwrap_or_default().to_string();
            tracing::warn!(%message, "login rejected");
            return Err(ManagerError::LoginFailed(message));
        }

        Ok(LoginSession {
            lines,
            writer,
            local_addr,
            peer_addr,
        })
    }

    /// Disable reconnection, including an attempt that is still logging in.
    fn disable_reconnect(&self) {
        let _connection = self.connection();
        self.stop_epoch.fetch_add(1, Ordering::SeqCst);
        self.should_reconnect.store(false, Ordering::SeqCst);
    }

    fn disconnect(&self) -> Result<()> {
        let connection = {
            let mut slot = self.connection();
            self.stop_epoch.fetch_add(1, Ordering::SeqCst);
            self.should_reconnect.store(false, Ordering::SeqCst);
            let connection = slot.take().ok_or(ManagerError::NotConnected)?;
            self.set_state(ConnectionState::Disconnecting);
            connection
        };
        // Dropping the writer lets the writer task flush queued actions and
        // shut down the write half; the signal ends the listener's read.
        let _ = connection.close_tx.send(());
        tracing::debug!(generation = connection.info.generation, "closed connection");
        Ok(())
    }

    async fn send(&self, action: &Action) -> Result<()> {
        tracing::debug!(action = %action.name(), "send");
        let writer = self.writer()?;
        writer.send(OutboundAction::encode(action)).await
    }

    async fn send_await(&self, mut action: Action, timeout: Duration) -> ActionReply {
        let action_id = action.ensure_action_id();
        let expected = expected_response(action.name());
        let mut pending = self.correlations.register(&action_id);

        if let Err(e) = self.send(&action).await {
            tracing::warn!(
                %action_id,
                "send failed (connection probably closed already): {}",
                e
            );
            self.correlations.deregister(&pending);
            return ActionReply::Flag(false);
        }

        let response = match tokio::time::timeout(timeout, pending.recv()).await {
            Ok(Some(block)) => block,
            Ok(None) => Block::new(),
            Err(_) => {
                tracing::debug!(%action_id, ?timeout, "no answer before timeout");
                self.correlations.deregister(&pending);
                Block::new()
            }
        };

        ActionReply::from_response(&response, expected)
    }

    /// Built-in reconnect hook, run by the listener once its read loop ends.
    pub(crate) async fn connection_lost(self: &Arc<Self>, generation: u64) {
        let current = {
            let mut connection = self.connection();
            let current = match connection.as_ref() {
                Some(c) => c.info.generation == generation,
                // Already taken by disconnect().
                None => self.generation.load(Ordering::SeqCst) == generation,
            };
            if current {
                *connection = None;
                self.set_state(ConnectionState::Disconnected);
            }
            current
        };

        if !current {
            // A newer connection is already installed; it keeps its state
            // and nothing needs to reconnect.
            tracing::debug!(generation, "connection replaced before its listener stopped");
            self.dispatcher.dispatch(Signal::Disconnect).await;
            return;
        }

        tracing::info!(generation, "connection lost");
        self.dispatcher.dispatch(Signal::Disconnect).await;

        if !self.should_reconnect.load(Ordering::SeqCst) {
            return;
        }
        let epoch = self.stop_epoch.load(Ordering::SeqCst);

        loop {
            tokio::time::sleep(self.config.reconnect_interval).await;
            if self.stop_epoch.load(Ordering::SeqCst) != epoch
                || !self.should_reconnect.load(Ordering::SeqCst)
            {
                tracing::info!("reconnection disabled, giving up");
                return;
            }
            match self.connect_at(true, epoch).await {
                Ok(()) => break,
                Err(e) => tracing::debug!("reconnect attempt failed: {}", e),
            }
        }

        tracing::info!("reconnected");
        self.dispatcher.dispatch(Signal::Reconnect).await;
    }
}

/// Read one block directly from the socket (login handshake).
async fn read_block(lines: &mut LineReader<OwnedReadHalf>) -> Result<Block> {
    let mut parser = BlockParser::new();
    let mut block = Block::new();

    loop {
        let line = lines.next_line().await?.ok_or(ManagerError::ConnectionClosed)?;
        tracing::trace!(line = %line.trim_end(), "read");
        if line == LINE_TERMINATOR {
            return Ok(block);
        }
        if let Some(field) = parser.feed(&line) {
            block.insert(field.key, field.value);
        }
    }
}
