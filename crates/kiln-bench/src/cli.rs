//! Command-line surface for the load generator.

use std::net::SocketAddr;

use clap::Parser;

/// Synthetic load generator for the Kiln wire protocol.
///
/// Opens `--workers` connections and drives each through a cyclic mix of
/// alive-checks, GET bursts, and PUT bursts — the same triplet pattern
/// real clients are observed to produce (`bulk_client.go`, `ucs-bender`) —
/// until `--requests` total connections have run.
#[derive(Debug, Parser)]
#[command(name = "kiln-bench", version, about)]
pub struct Args {
    /// Address of the running `kilnd` namespace port to connect to.
    #[arg(long)]
    pub address: SocketAddr,

    /// Number of connections to run concurrently.
    #[arg(long, default_value_t = 10)]
    pub workers: usize,

    /// Total number of connections to drive before reporting and exiting.
    #[arg(long, default_value_t = 1000)]
    pub requests: u64,

    /// Payload size in bytes used for synthetic PUTs.
    #[arg(long, default_value_t = 4096)]
    pub payload_size: usize,

    /// GET requests issued per "GET burst" connection.
    #[arg(long, default_value_t = 10)]
    pub gets_per_burst: usize,

    /// Identifiers written per "PUT burst" connection.
    #[arg(long, default_value_t = 10)]
    pub puts_per_burst: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
