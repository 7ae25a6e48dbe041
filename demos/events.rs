//! Event monitor - prints every event and keeps the connection alive.
//!
//! This example demonstrates:
//! - Registering event and lifecycle hooks
//! - Automatic reconnection
//! - Correlated `ping` round trips
//!
//! # Running
//!
//! ```sh
//! AMI_HOST=pbx.local AMI_USER=admin AMI_SECRET=s3cret \
//!     RUST_LOG=amiwire_client=debug cargo run --example events
//! ```

use std::time::Duration;

use amiwire_client::{Action, ConnectionState, HookKind, Manager, Signal};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::var("AMI_HOST").unwrap_or_else(|_| "localhost".to_string());
    let username = std::env::var("AMI_USER").unwrap_or_else(|_| "admin".to_string());
    let secret = std::env::var("AMI_SECRET").unwrap_or_default();

    let manager = Manager::builder(username, secret)
        .host(host)
        .reconnect_interval(Duration::from_secs(2))
        .build()
        .await?;

    manager.register_hook(HookKind::Event, |signal: Signal| async move {
        if let Some(block) = signal.block() {
            let mut fields: Vec<_> = block.iter().collect();
            fields.sort();
            println!("{:?}", fields);
        }
    });
    manager.register_hook(HookKind::Disconnect, |_: Signal| async {
        println!("-- disconnected, waiting for the server");
    });
    manager.register_hook(HookKind::Reconnect, |_: Signal| async {
        println!("-- reconnected");
    });

    manager.connect(true).await?;

    let pinger = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if pinger.is_connected() {
                let reply = pinger.ping_await(Action::default(), None).await;
                tracing::info!(alive = reply.is_success(), "ping");
            }
        }
    });

    tokio::select! {
        _ = manager.join() => {}
        _ = tokio::signal::ctrl_c() => {
            manager.logoff(Action::default()).await?;
            manager
                .wait_for_state(ConnectionState::Disconnected, Duration::from_secs(5))
                .await;
        }
    }
    Ok(())
}
