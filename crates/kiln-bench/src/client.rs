//! Raw wire-protocol client used by the load generator.
//!
//! Deliberately thin: it reuses `kiln_core::protocol`'s framing constants
//! and hex helpers directly rather than re-deriving them, so a drift in
//! the wire format breaks this crate's build instead of silently
//! desyncing from the server — grounded on `bulk_client.go`'s
//! `NegotiateVersion`/`Get`/`Put`/`Execute`, adapted from buffer-then-flush
//! batching to a single persistent `TcpStream`.

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use kiln_core::protocol::{format_hex, opcode, parse_hex_u64, response, HANDSHAKE_VERSION, IDENTIFIER_WIDTH, SIZE_HEX_WIDTH, VERSION_HEX_WIDTH};
use kiln_core::{Identifier, Kind};

/// A single connection to a `kilnd` namespace port, past the handshake.
pub struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    /// Connect and perform the version handshake. Fails if the server
    /// doesn't echo back the version this client sent.
    pub async fn connect(address: std::net::SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("connecting to {address}"))?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        write_half
            .write_all(format_hex(HANDSHAKE_VERSION as u64, VERSION_HEX_WIDTH).as_bytes())
            .await?;

        let mut echoed = [0u8; VERSION_HEX_WIDTH];
        reader.read_exact(&mut echoed).await.context("reading handshake echo")?;
        let version = parse_hex_u64(&echoed)?;
        if version != HANDSHAKE_VERSION as u64 {
            bail!("server rejected handshake version, echoed {:#x}", version);
        }

        Ok(Self {
            reader,
            writer: write_half,
        })
    }

    /// Send a `g<k>` command. Does not wait for the response — callers
    /// that pipeline a burst of GETs call this repeatedly, then drain
    /// responses with [`Client::read_get_response`].
    pub async fn send_get(&mut self, id: Identifier, kind: Kind) -> Result<()> {
        let mut cmd = BytesMut::with_capacity(2 + IDENTIFIER_WIDTH);
        cmd.extend_from_slice(&[opcode::GET, kind.as_byte()]);
        cmd.extend_from_slice(&id.to_bytes());
        self.writer.write_all(&cmd).await?;
        Ok(())
    }

    /// Read one GET response off the wire: `(kind, id, payload)` where an
    /// empty payload `Option` means a miss.
    pub async fn read_get_response(&mut self) -> Result<(Kind, Identifier, Option<Bytes>)> {
        let mut head = [0u8; 2];
        self.reader.read_exact(&mut head).await?;
        let kind = Kind::try_from(head[1])?;

        match head[0] {
            response::HIT => {
                let mut size_hex = [0u8; SIZE_HEX_WIDTH];
                self.reader.read_exact(&mut size_hex).await?;
                let size = parse_hex_u64(&size_hex)?;
                let mut id_bytes = [0u8; IDENTIFIER_WIDTH];
                self.reader.read_exact(&mut id_bytes).await?;
                let mut payload = vec![0u8; size as usize];
                self.reader.read_exact(&mut payload).await?;
                let id = Identifier::from_bytes(id_bytes);
                Ok((kind, id, Some(Bytes::from(payload))))
            }
            response::MISS => {
                let mut id_bytes = [0u8; IDENTIFIER_WIDTH];
                self.reader.read_exact(&mut id_bytes).await?;
                let id = Identifier::from_bytes(id_bytes);
                Ok((kind, id, None))
            }
            other => bail!("unexpected GET response marker byte {:#04x}", other),
        }
    }

    /// Open a transaction, write one payload per kind, and commit — one
    /// full PUT round-trip. Produces no response on the wire.
    pub async fn put_line(&mut self, id: Identifier, payloads: &[(Kind, Bytes)]) -> Result<()> {
        let mut cmd = BytesMut::new();
        cmd.extend_from_slice(&[opcode::TRANSACTION, opcode::TRANSACTION_START]);
        cmd.extend_from_slice(&id.to_bytes());
        for (kind, data) in payloads {
            cmd.extend_from_slice(&[opcode::PUT, kind.as_byte()]);
            cmd.extend_from_slice(format_hex(data.len() as u64, SIZE_HEX_WIDTH).as_bytes());
            cmd.extend_from_slice(data);
        }
        cmd.extend_from_slice(&[opcode::TRANSACTION, opcode::TRANSACTION_END]);
        self.writer.write_all(&cmd).await?;
        Ok(())
    }

    /// Gracefully close the connection.
    pub async fn quit(mut self) -> Result<()> {
        self.writer.write_all(&[opcode::QUIT]).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
