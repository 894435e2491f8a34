//! kiln-bench — synthetic load generator for the Kiln wire protocol.
//!
//! Drives `--workers` concurrent connections against a running `kilnd`
//! namespace port until `--requests` connections have completed, then
//! prints latency/throughput statistics to stdout. Grounded on the
//! original benchmark harness (`bulk_client.go`, `cmd/ucs-bender`); unlike
//! that harness this one speaks the wire protocol through `kiln-core`
//! directly rather than through a generic load-test library, so client
//! and server share one source of truth for framing.

mod cli;
mod client;
mod stats;
mod workload;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::sync::mpsc;

use stats::{Aggregator, ConnectionSample};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let verbosity = if args.verbose > 0 {
        "kiln_bench=debug"
    } else {
        "kiln_bench=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| verbosity.into()),
        )
        .init();

    println!(
        "kiln-bench: {} workers, {} connections, target {}",
        args.workers, args.requests, args.address
    );

    let next_round = Arc::new(AtomicU64::new(0));
    let (sample_tx, mut sample_rx) = mpsc::channel::<ConnectionSample>(1024);

    let started = Instant::now();
    let mut workers = Vec::with_capacity(args.workers);
    for _ in 0..args.workers {
        let next_round = next_round.clone();
        let sample_tx = sample_tx.clone();
        let address = args.address;
        let total = args.requests;
        let gets_per_burst = args.gets_per_burst;
        let puts_per_burst = args.puts_per_burst;
        let payload_size = args.payload_size;

        workers.push(tokio::spawn(async move {
            loop {
                let round = next_round.fetch_add(1, Ordering::Relaxed);
                if round >= total {
                    return;
                }
                match workload::run_one(address, round, gets_per_burst, puts_per_burst, payload_size)
                    .await
                {
                    Ok(sample) => {
                        let _ = sample_tx.send(sample).await;
                    }
                    Err(error) => {
                        tracing::warn!(%error, round, "connection failed");
                    }
                }
            }
        }));
    }
    drop(sample_tx);

    let mut aggregator = Aggregator::default();
    while let Some(sample) = sample_rx.recv().await {
        aggregator.record(sample);
    }

    for worker in workers {
        let _ = worker.await;
    }

    print!("{}", aggregator.report(started.elapsed()));
    Ok(())
}
