//! Per-namespace accept loop.
//!
//! One `Listener` per `--port namespace:port` pair. Each accepted
//! connection gets its own [`Engine`] (read half, drives the command
//! stream) and [`responder`] task (write half, drains that connection's
//! GET queue) — the two halves of one `TcpStream`, reunited only by the
//! socket itself, never by a shared lock.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use kiln_cache::CacheBackend;

use crate::engine::Engine;
use crate::responder;

pub async fn run(
    namespace: String,
    port: u16,
    backend: Arc<dyn CacheBackend>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(namespace, port, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let namespace = namespace.clone();
                let backend = backend.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, namespace, backend).await {
                        tracing::warn!(%peer, %error, "connection closed");
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!(namespace, port, "listener shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    namespace: String,
    backend: Arc<dyn CacheBackend>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    let (get_tx, get_rx) = responder::channel();

    let responder_task = tokio::spawn(responder::run(
        backend.clone(),
        get_rx,
        write_half,
        namespace.clone(),
    ));

    let engine = Engine::new(read_half, namespace, backend, get_tx);
    let result = engine.run().await;
    let _ = responder_task.await;
    result.map_err(anyhow::Error::from)
}
