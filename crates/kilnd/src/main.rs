//! kilnd — the Kiln content-addressed asset cache daemon.

mod cli;
mod engine;
mod error;
mod http;
mod listener;
mod metrics;
mod responder;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;

use kiln_cache::{CacheBackend, FsCache, MemoryCache, NopCache};
use kiln_core::config::CacheBackendKind;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    args.validate().context("invalid arguments")?;

    let verbosity = match args.verbose {
        0 => "kilnd=info,kiln_cache=info",
        1 => "kilnd=debug,kiln_cache=debug",
        _ => "kilnd=trace,kiln_cache=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| verbosity.into()),
        )
        .init();

    let prometheus = metrics::install().context("installing metrics recorder")?;

    let ports = args.ports();
    tracing::info!(
        backend = ?args.cache_backend,
        quota = args.quota,
        namespaces = ports.len(),
        "kilnd starting"
    );

    let backend: Arc<dyn CacheBackend> = match args.cache_backend {
        CacheBackendKind::Nop => Arc::new(NopCache::new()),
        CacheBackendKind::Memory => Arc::new(MemoryCache::new(args.quota)),
        CacheBackendKind::Fs => {
            let path = args
                .cache_path
                .clone()
                .expect("validated: fs backend requires --cache-path");
            Arc::new(FsCache::open(path, args.quota).await.context("opening fs cache")?)
        }
    };

    let (shutdown_tx, _) = broadcast::channel(1);

    let mut listener_tasks = Vec::new();
    for port_ns in &ports {
        let namespace = port_ns.namespace.clone();
        let port = port_ns.port;
        let backend = backend.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        listener_tasks.push(tokio::spawn(async move {
            if let Err(error) = listener::run(namespace.clone(), port, backend, shutdown_rx).await {
                tracing::error!(namespace, port, %error, "listener task exited with error");
            }
        }));
    }

    let http_task = if let Some(addr) = args.http_address {
        let state = http::AdminState {
            prometheus,
            backend_kind: backend_kind_name(args.cache_backend),
            ports: Arc::new(ports),
        };
        Some(tokio::spawn(async move {
            if let Err(error) = http::serve(addr, state).await {
                tracing::error!(%error, "admin http endpoint exited with error");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(());

    for task in listener_tasks {
        let _ = task.await;
    }
    if let Some(task) = http_task {
        task.abort();
    }

    Ok(())
}

fn backend_kind_name(kind: CacheBackendKind) -> &'static str {
    match kind {
        CacheBackendKind::Fs => "fs",
        CacheBackendKind::Memory => "memory",
        CacheBackendKind::Nop => "nop",
    }
}
