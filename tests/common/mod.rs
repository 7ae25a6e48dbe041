//! In-process manager interface server for integration tests.
//!
//! Accepts `user` / `valid`, answers `ping` with `Pong`, `logoff` with
//! `Goodbye` (then closes), `getvar` with `value-of-<variable>`, and every
//! other action with `Success`. Replies
//! echo the caller's `ActionID`. Per-action scripts override the default.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const USERNAME: &str = "user";
pub const SECRET: &str = "valid";

/// Generous bound for "eventually" assertions.
pub const WAIT: Duration = Duration::from_secs(5);

pub type Fields = Vec<(String, String)>;

pub fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

enum Outbound {
    Block(Fields),
    Raw(String),
    Close,
}

#[derive(Default)]
struct State {
    clients: Mutex<Vec<mpsc::UnboundedSender<Outbound>>>,
    lines: Mutex<Vec<String>>,
    actions: Mutex<Vec<HashMap<String, String>>>,
    scripts: Mutex<HashMap<String, Vec<Fields>>>,
    delays: Mutex<HashMap<String, Duration>>,
    logins: AtomicUsize,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<State>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let state = Arc::new(State::default());
        let accept_task = tokio::spawn(accept_loop(listener, state.clone()));

        Self {
            addr,
            state,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting and close every open connection. Returns once the
    /// port is released.
    pub async fn stop(&self) {
        let task = self.accept_task.lock().unwrap().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.drop_connections();
    }

    /// Accept again on the same port.
    pub async fn restart(&self) {
        let listener = TcpListener::bind(self.addr).await.expect("rebind mock server");
        let task = tokio::spawn(accept_loop(listener, self.state.clone()));
        *self.accept_task.lock().unwrap() = Some(task);
    }

    /// Close every open connection, keep accepting.
    pub fn drop_connections(&self) {
        for client in self.state.clients.lock().unwrap().drain(..) {
            let _ = client.send(Outbound::Close);
        }
    }

    /// Push a block to every open connection.
    pub fn send_block(&self, block: Fields) {
        self.state
            .clients
            .lock()
            .unwrap()
            .retain(|client| client.send(Outbound::Block(block.clone())).is_ok());
    }

    /// Replace the reply to `action` with `blocks`. Blocks without an
    /// `Event` field get the caller's `ActionID`. No blocks: no reply.
    pub fn script(&self, action: &str, blocks: Vec<Fields>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(action.to_lowercase(), blocks);
    }

    /// Write `text` to every open connection as is.
    pub fn send_raw(&self, text: &str) {
        self.state
            .clients
            .lock()
            .unwrap()
            .retain(|client| client.send(Outbound::Raw(text.to_string())).is_ok());
    }

    /// Hold back the reply to every later `action` by `delay`.
    pub fn reply_delay(&self, action: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(action.to_lowercase(), delay);
    }

    /// Every line received so far, without its CRLF.
    pub fn lines(&self) -> Vec<String> {
        self.state.lines.lock().unwrap().clone()
    }

    /// Every action received so far, keys lowercased.
    pub fn actions(&self) -> Vec<HashMap<String, String>> {
        self.state.actions.lock().unwrap().clone()
    }

    pub fn actions_named(&self, name: &str) -> Vec<HashMap<String, String>> {
        self.actions()
            .into_iter()
            .filter(|a| a.get("action").map(String::as_str) == Some(name))
            .collect()
    }

    /// Number of accepted logins.
    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
        self.drop_connections();
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<State>) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        state.clients.lock().unwrap().push(tx.clone());
        tokio::spawn(serve(socket, state.clone(), tx, rx));
    }
}

async fn serve(
    socket: TcpStream,
    state: Arc<State>,
    tx: mpsc::UnboundedSender<Outbound>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let (read_half, mut write_half) = socket.into_split();
    let reader = tokio::spawn(read_actions(read_half, state, tx));

    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Block(block) => {
                let mut wire = String::new();
                for (key, value) in &block {
                    wire.push_str(&format!("{key}: {value}\r\n"));
                }
                wire.push_str("\r\n");
                if write_half.write_all(wire.as_bytes()).await.is_err() {
                    break;
                }
            }
            Outbound::Raw(text) => {
                if write_half.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    let _ = write_half.shutdown().await;
    reader.abort();
}

async fn read_actions(
    read_half: OwnedReadHalf,
    state: Arc<State>,
    tx: mpsc::UnboundedSender<Outbound>,
) {
    let mut reader = BufReader::new(read_half);
    let mut action: HashMap<String, String> = HashMap::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let text = line.trim_end_matches(['\r', '\n']).to_string();
        state.lines.lock().unwrap().push(text.clone());

        if text.is_empty() {
            let complete = std::mem::take(&mut action);
            state.actions.lock().unwrap().push(complete.clone());
            let replies = reply_to(&state, &complete);
            let name = complete.get("action").cloned().unwrap_or_default().to_lowercase();
            let delay = state.delays.lock().unwrap().get(&name).copied();
            match delay {
                Some(delay) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        for outbound in replies {
                            let _ = tx.send(outbound);
                        }
                    });
                }
                None => {
                    for outbound in replies {
                        if tx.send(outbound).is_err() {
                            return;
                        }
                    }
                }
            }
        } else if let Some((key, value)) = text.split_once(':') {
            action.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
}

fn reply_to(state: &State, action: &HashMap<String, String>) -> Vec<Outbound> {
    let name = action.get("action").cloned().unwrap_or_default().to_lowercase();
    let action_id = action.get("actionid").cloned();
    let with_id = |mut block: Fields| {
        if let Some(id) = &action_id {
            if !block.iter().any(|(k, _)| k.eq_ignore_ascii_case("event")) {
                block.push(("ActionID".to_string(), id.clone()));
            }
        }
        Outbound::Block(block)
    };

    if let Some(blocks) = state.scripts.lock().unwrap().get(&name) {
        return blocks.iter().cloned().map(with_id).collect();
    }

    match name.as_str() {
        "login" => {
            let valid = action.get("username").map(String::as_str) == Some(USERNAME)
                && action.get("secret").map(String::as_str) == Some(SECRET);
            if valid {
                state.logins.fetch_add(1, Ordering::SeqCst);
                vec![with_id(fields(&[
                    ("Response", "Success"),
                    ("Message", "Authentication accepted"),
                ]))]
            } else {
                vec![
                    with_id(fields(&[
                        ("Response", "Error"),
                        ("Message", "Authentication failed"),
                    ])),
                    Outbound::Close,
                ]
            }
        }
        "logoff" => vec![
            with_id(fields(&[
                ("Response", "Goodbye"),
                ("Message", "Thanks for all the fish."),
            ])),
            Outbound::Close,
        ],
        "ping" => vec![with_id(fields(&[("Response", "Pong")]))],
        "getvar" => {
            let variable = action.get("variable").cloned().unwrap_or_default();
            let value = format!("value-of-{variable}");
            vec![with_id(fields(&[
                ("Response", "Success"),
                ("Variable", variable.as_str()),
                ("Value", value.as_str()),
            ]))]
        }
        _ => vec![with_id(fields(&[("Response", "Success")]))],
    }
}
