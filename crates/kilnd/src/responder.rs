//! The `GetResponder` — the other half of the decoupled connection design.
//!
//! The engine never calls `CacheBackend::get` itself. It only pushes a
//! [`GetRequest`] onto a bounded channel and moves straight on to parsing
//! the client's next command, so a burst of pipelined `g` commands can be
//! read off the socket as fast as they arrive even if the cache backend
//! (especially `FsCache`, which may hit disk) answers slower than that.
//! One responder task per connection owns the write half and drains the
//! channel strictly in order, so responses land on the wire in the same
//! order the client sent the requests — the one property pipelining
//! depends on.
//!
//! The handshake's version echo rides the same channel as the very first
//! message: the engine owns the read half only, so it cannot write the
//! echo itself, and routing it through here keeps the "one writer" rule
//! intact without requiring the engine to briefly borrow the write half.
//!
//! The channel is bounded at 100,000 entries: deep enough that a realistic
//! pipelined burst never blocks the engine's read loop, but finite, so a
//! responder that's falling permanently behind eventually applies
//! backpressure instead of growing without limit.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use kiln_cache::CacheBackend;
use kiln_core::protocol::{format_hex, response, SIZE_HEX_WIDTH};
use kiln_core::{Identifier, Kind};

pub const GET_QUEUE_CAPACITY: usize = 100_000;

pub struct GetRequest {
    pub namespace: String,
    pub id: Identifier,
    pub kind: Kind,
}

/// Everything the engine hands to the responder to put on the wire, in the
/// order it must appear there.
pub enum ResponderMessage {
    /// Raw bytes to write verbatim — used only for the handshake echo.
    Raw(Bytes),
    Get(GetRequest),
}

pub fn channel() -> (mpsc::Sender<ResponderMessage>, mpsc::Receiver<ResponderMessage>) {
    mpsc::channel(GET_QUEUE_CAPACITY)
}

/// Drain `rx`, resolving each request against `backend` and writing its
/// response to `writer` in arrival order. Returns when the channel closes
/// (the engine dropped its sender) or a write fails (the peer is gone).
pub async fn run(
    backend: Arc<dyn CacheBackend>,
    mut rx: mpsc::Receiver<ResponderMessage>,
    mut writer: OwnedWriteHalf,
    namespace_label: String,
) {
    while let Some(message) = rx.recv().await {
        let wire = match message {
            ResponderMessage::Raw(bytes) => bytes,
            ResponderMessage::Get(request) => {
                let started = std::time::Instant::now();
                let result = backend.get(&request.namespace, request.id, request.kind).await;
                metrics::histogram!(
                    "kiln_get_duration_seconds",
                    "namespace" => namespace_label.clone()
                )
                .record(started.elapsed().as_secs_f64());
                encode_response(&namespace_label, request.kind, request.id, result).freeze()
            }
        };

        if writer.write_all(&wire).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

fn encode_response(
    namespace: &str,
    kind: Kind,
    id: Identifier,
    result: Result<Option<bytes::Bytes>, kiln_cache::CacheError>,
) -> BytesMut {
    match result {
        Ok(Some(data)) => {
            metrics::counter!("kiln_get_hits_total", "namespace" => namespace.to_string(), "kind" => kind.label())
                .increment(1);
            metrics::counter!("kiln_get_bytes_total", "namespace" => namespace.to_string(), "kind" => kind.label())
                .increment(data.len() as u64);
            let mut out = BytesMut::with_capacity(2 + SIZE_HEX_WIDTH + id.to_bytes().len() + data.len());
            out.extend_from_slice(&[response::HIT, kind.as_byte()]);
            out.extend_from_slice(format_hex(data.len() as u64, SIZE_HEX_WIDTH).as_bytes());
            out.extend_from_slice(&id.to_bytes());
            out.extend_from_slice(&data);
            out
        }
        Ok(None) => {
            metrics::counter!("kiln_get_misses_total", "namespace" => namespace.to_string(), "kind" => kind.label())
                .increment(1);
            encode_miss(kind, id)
        }
        Err(error) => {
            tracing::warn!(%error, "get lookup failed, reporting as miss");
            encode_miss(kind, id)
        }
    }
}

fn encode_miss(kind: Kind, id: Identifier) -> BytesMut {
    let mut out = BytesMut::with_capacity(2 + id.to_bytes().len());
    out.extend_from_slice(&[response::MISS, kind.as_byte()]);
    out.extend_from_slice(&id.to_bytes());
    out
}
