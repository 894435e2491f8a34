//! The protocol engine — one instance per accepted connection.
//!
//! Parses the handshake and then the command stream (`g`/`t`+`s`/`t`+`e`/
//! `p`/`q`), mutating the cache backend directly for everything except
//! `g`, which it hands off to the [`responder`] so the read loop never
//! waits on a cache lookup. Any framing violation or out-of-order
//! transaction command is fatal: the engine logs it and closes the
//! connection rather than trying to resynchronise the byte stream.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::time::timeout;

use kiln_cache::{CacheBackend, CacheTransaction};
use kiln_core::protocol::{
    self, format_hex, opcode, parse_hex_u64, FramingError, HANDSHAKE_VERSION, SIZE_HEX_WIDTH,
    VERSION_HEX_MIN_WIDTH, VERSION_HEX_WIDTH,
};
use kiln_core::{Identifier, Kind};

use crate::error::ProtocolError;
use crate::responder::{GetRequest, ResponderMessage};

pub const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(30);
pub const COMMAND_DEADLINE: Duration = Duration::from_secs(300);

pub struct Engine {
    reader: BufReader<OwnedReadHalf>,
    namespace: String,
    backend: Arc<dyn CacheBackend>,
    get_tx: mpsc::Sender<ResponderMessage>,
    current_tx: Option<(Identifier, Box<dyn CacheTransaction>)>,
}

impl Engine {
    pub fn new(
        read_half: OwnedReadHalf,
        namespace: String,
        backend: Arc<dyn CacheBackend>,
        get_tx: mpsc::Sender<ResponderMessage>,
    ) -> Self {
        Self {
            reader: BufReader::new(read_half),
            namespace,
            backend,
            get_tx,
            current_tx: None,
        }
    }

    /// Run the connection to completion. Every error is fatal and closes
    /// the connection; a clean `q` or peer disconnect returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ProtocolError> {
        let version = match timeout(HANDSHAKE_DEADLINE, read_handshake_version(&mut self.reader))
            .await
            .map_err(|_| ProtocolError::Timeout)?
        {
            Ok(version) => version,
            Err(error @ ProtocolError::BadHexField(_)) => {
                // Non-hex handshake bytes still owe the client the all-zero
                // echo before closing, same as a well-formed but wrong
                // version, so it can tell this apart from a dropped socket.
                let _ = self
                    .get_tx
                    .send(ResponderMessage::Raw(Bytes::from(format_hex(0, VERSION_HEX_WIDTH))))
                    .await;
                return Err(error);
            }
            Err(error) => return Err(error),
        };
        if version != HANDSHAKE_VERSION as u64 {
            // Protocol says to write an all-zero echo before closing, so the
            // client can tell "wrong version" apart from a dropped socket.
            let _ = self
                .get_tx
                .send(ResponderMessage::Raw(Bytes::from(format_hex(0, VERSION_HEX_WIDTH))))
                .await;
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        self.get_tx
            .send(ResponderMessage::Raw(Bytes::from(format_hex(
                version,
                VERSION_HEX_WIDTH,
            ))))
            .await
            .map_err(|_| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "get responder task is gone",
                ))
            })?;

        loop {
            let opcode = match timeout(COMMAND_DEADLINE, read_opcode(&mut self.reader))
                .await
                .map_err(|_| ProtocolError::Timeout)?
            {
                Ok(Some(byte)) => byte,
                Ok(None) => return Ok(()),
                Err(error) => return Err(error),
            };

            let keep_going = timeout(COMMAND_DEADLINE, self.dispatch(opcode))
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            if !keep_going {
                return Ok(());
            }
        }
    }

    /// Returns `Ok(false)` exactly for a clean `q`, which should end the
    /// connection without treating it as an error.
    async fn dispatch(&mut self, op: u8) -> Result<bool, ProtocolError> {
        match op {
            opcode::GET => self.handle_get().await.map(|()| true),
            opcode::TRANSACTION => self.handle_transaction().await.map(|()| true),
            opcode::PUT => self.handle_put().await.map(|()| true),
            opcode::QUIT => self.handle_quit().await.map(|()| false),
            other => {
                metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "invalid")
                    .increment(1);
                Err(ProtocolError::UnknownOpcode(other))
            }
        }
    }

    async fn handle_get(&mut self) -> Result<(), ProtocolError> {
        let mut id_bytes = [0u8; protocol::IDENTIFIER_WIDTH];
        read_exact_cmd(&mut self.reader, &mut id_bytes).await?;
        let mut kind_byte = [0u8; 1];
        read_exact_cmd(&mut self.reader, &mut kind_byte).await?;
        let kind = Kind::try_from(kind_byte[0])?;
        let id = Identifier::from_bytes(id_bytes);

        metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "get")
            .increment(1);

        self.get_tx
            .send(ResponderMessage::Get(GetRequest {
                namespace: self.namespace.clone(),
                id,
                kind,
            }))
            .await
            .map_err(|_| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "get responder task is gone",
                ))
            })
    }

    async fn handle_transaction(&mut self) -> Result<(), ProtocolError> {
        let mut sub = [0u8; 1];
        read_exact_cmd(&mut self.reader, &mut sub).await?;
        match sub[0] {
            opcode::TRANSACTION_START => {
                let mut id_bytes = [0u8; protocol::IDENTIFIER_WIDTH];
                read_exact_cmd(&mut self.reader, &mut id_bytes).await?;
                if self.current_tx.is_some() {
                    return Err(ProtocolError::TransactionAlreadyOpen);
                }
                let id = Identifier::from_bytes(id_bytes);
                self.current_tx = Some((id, self.backend.begin(&self.namespace, id)));
                metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "ts")
                    .increment(1);
                Ok(())
            }
            opcode::TRANSACTION_END => {
                let (id, tx) = self.current_tx.take().ok_or(ProtocolError::NoTransactionOpen)?;
                if let Err(error) = tx.commit().await {
                    tracing::warn!(namespace = %self.namespace, %id, %error, "transaction commit failed, connection continues");
                }
                metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "te")
                    .increment(1);
                Ok(())
            }
            other => Err(ProtocolError::UnknownTransactionOpcode(other)),
        }
    }

    async fn handle_put(&mut self) -> Result<(), ProtocolError> {
        let mut kind_byte = [0u8; 1];
        read_exact_cmd(&mut self.reader, &mut kind_byte).await?;
        let kind = Kind::try_from(kind_byte[0])?;

        let mut size_hex = [0u8; SIZE_HEX_WIDTH];
        read_exact_cmd(&mut self.reader, &mut size_hex).await?;
        let size = parse_hex_u64(&size_hex)?;

        let mut payload = vec![0u8; size as usize];
        read_exact_cmd(&mut self.reader, &mut payload).await?;

        let (_, tx) = self
            .current_tx
            .as_mut()
            .ok_or(ProtocolError::PutOutsideTransaction)?;
        let started = std::time::Instant::now();
        tx.put(kind, Bytes::from(payload)).await?;
        metrics::histogram!("kiln_put_duration_seconds", "namespace" => self.namespace.clone())
            .record(started.elapsed().as_secs_f64());

        metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "put")
            .increment(1);
        metrics::histogram!("kiln_put_bytes", "namespace" => self.namespace.clone())
            .record(size as f64);
        Ok(())
    }

    async fn handle_quit(&mut self) -> Result<(), ProtocolError> {
        if let Some((_, tx)) = self.current_tx.take() {
            let _ = tx.abort().await;
        }
        metrics::counter!("kiln_ops_total", "namespace" => self.namespace.clone(), "op" => "quit")
            .increment(1);
        Ok(())
    }
}

/// Read the handshake's hex version field, tolerating short forms: the
/// server looks at whatever arrived in the handshake's first network read,
/// clamped to between [`VERSION_HEX_MIN_WIDTH`] and [`VERSION_HEX_WIDTH`]
/// bytes, and parses the longest hex prefix of that window — so `"fe"` and
/// `"000000fe"` both resolve to the same version number, and any trailing
/// non-hex byte (the first byte of the next command) is left in the buffer
/// rather than consumed.
async fn read_handshake_version(
    reader: &mut BufReader<OwnedReadHalf>,
) -> Result<u64, ProtocolError> {
    let buffered = reader.fill_buf().await?;
    if buffered.is_empty() {
        return Err(ProtocolError::HandshakeEof);
    }
    if buffered.len() < VERSION_HEX_MIN_WIDTH {
        return Err(ProtocolError::BadHexField(FramingError::NotHex));
    }
    let take = buffered.len().min(VERSION_HEX_WIDTH);
    let hex_len = buffered[..take]
        .iter()
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    if hex_len < VERSION_HEX_MIN_WIDTH {
        return Err(ProtocolError::BadHexField(FramingError::NotHex));
    }
    let version = parse_hex_u64(&buffered[..hex_len])?;
    reader.consume(hex_len);
    Ok(version)
}

async fn read_opcode(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<u8>, ProtocolError> {
    let mut byte = [0u8; 1];
    match reader.read(&mut byte).await? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

async fn read_exact_cmd(
    reader: &mut BufReader<OwnedReadHalf>,
    buf: &mut [u8],
) -> Result<(), ProtocolError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::UnexpectedEof)
        }
        Err(error) => Err(error.into()),
    }
}
