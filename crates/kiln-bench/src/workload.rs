//! Synthetic request patterns, cycling through the same triplet the
//! original benchmark observed real clients producing
//! (`cmd/ucs-bender/main.go`'s `SyntheticCacheRequests`): a bare
//! aliveness check, a burst of GETs, then a burst of PUTs.

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Result;
use bytes::Bytes;
use rand::Rng;

use kiln_core::{Identifier, Kind};

use crate::client::Client;
use crate::stats::{ConnectionKind, ConnectionSample};

fn random_identifier(rng: &mut impl Rng) -> Identifier {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    Identifier::from_bytes(bytes)
}

/// Run one connection of the pattern selected by `round % 3`, and return
/// its timing sample.
pub async fn run_one(
    address: SocketAddr,
    round: u64,
    gets_per_burst: usize,
    puts_per_burst: usize,
    payload_size: usize,
) -> Result<ConnectionSample> {
    let started = Instant::now();
    let mut rng = rand::thread_rng();

    let (kind, ops, bytes) = match round % 3 {
        0 => {
            let client = Client::connect(address).await?;
            client.quit().await?;
            (ConnectionKind::AliveCheck, 0, 0)
        }
        1 => {
            let mut client = Client::connect(address).await?;
            let mut ids = Vec::with_capacity(gets_per_burst);
            for _ in 0..gets_per_burst {
                let id = random_identifier(&mut rng);
                client.send_get(id, Kind::Info).await?;
                client.send_get(id, Kind::Asset).await?;
                ids.push(id);
            }
            let mut bytes = 0u64;
            for _ in 0..ids.len() * 2 {
                let (_, _, data) = client.read_get_response().await?;
                bytes += data.map(|b| b.len() as u64).unwrap_or(0);
            }
            client.quit().await?;
            (ConnectionKind::GetBurst, (ids.len() * 2) as u64, bytes)
        }
        _ => {
            let mut client = Client::connect(address).await?;
            let mut bytes = 0u64;
            for _ in 0..puts_per_burst {
                let id = random_identifier(&mut rng);
                let info = Bytes::from(vec![b'i'; payload_size]);
                let asset = Bytes::from(vec![b'a'; payload_size]);
                bytes += (info.len() + asset.len()) as u64;
                client
                    .put_line(id, &[(Kind::Info, info), (Kind::Asset, asset)])
                    .await?;
            }
            client.quit().await?;
            (ConnectionKind::PutBurst, puts_per_burst as u64, bytes)
        }
    };

    Ok(ConnectionSample {
        kind,
        elapsed: started.elapsed(),
        ops,
        bytes,
    })
}
