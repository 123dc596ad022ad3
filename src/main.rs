use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sightline::config::Config;
use sightline::gateway::{HttpGateway, PerceptionGateway};
use sightline::memory::MemoryStore;
use sightline::outbound::{ChannelSink, ClientMessage};
use sightline::task::TaskBoard;
use sightline::SessionEngine;

/// Standalone driver: boots the core and holds one headless session open so
/// the engine can be observed without a transport attached. A real transport
/// layer calls `SessionEngine::spawn` per connection instead.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("sightline booting");

    let config = Arc::new(Config::from_env());
    let gateway: Arc<dyn PerceptionGateway> = Arc::new(HttpGateway::new(Arc::clone(&config)));
    let memory = Arc::new(MemoryStore::open(&config.memory_path));
    let board = Arc::new(TaskBoard::new());

    let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(64);
    let sink = Arc::new(ChannelSink::new(out_tx));

    let session = SessionEngine::spawn(gateway, sink, memory, board, config);

    // Drain outbound messages to the log in lieu of a client.
    let drain = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match &msg {
                ClientMessage::Speak { text } => info!(%text, "speak"),
                other => info!(message = ?other, "outbound"),
            }
        }
    });

    info!("sightline active; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    session.close().await;
    drain.abort();
    Ok(())
}
