//! Byte-level helpers for driving the protocol directly over a raw
//! `TcpStream`, independent of any client library, so these tests exercise
//! exactly the bytes documented on the wire.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use kiln_core::protocol::{format_hex, opcode, parse_hex_u64, response, HANDSHAKE_VERSION, IDENTIFIER_WIDTH, SIZE_HEX_WIDTH, VERSION_HEX_WIDTH};
use kiln_core::{Identifier, Kind};

/// Send the handshake using `text` verbatim (no padding/validation), and
/// return whatever the server echoes back, or `None` if it closed first.
pub fn handshake_raw(stream: &mut TcpStream, text: &[u8]) -> Option<[u8; VERSION_HEX_WIDTH]> {
    stream.write_all(text).expect("writing handshake");
    let mut echoed = [0u8; VERSION_HEX_WIDTH];
    match stream.read_exact(&mut echoed) {
        Ok(()) => Some(echoed),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
        Err(e) => panic!("reading handshake echo: {e}"),
    }
}

/// Perform the normal, successful handshake and return the connection past
/// it, ready for commands.
pub fn handshake(stream: &mut TcpStream) {
    let echoed = handshake_raw(stream, format_hex(HANDSHAKE_VERSION as u64, VERSION_HEX_WIDTH).as_bytes())
        .expect("server closed during handshake");
    assert_eq!(parse_hex_u64(&echoed).unwrap(), HANDSHAKE_VERSION as u64);
}

/// Build a distinct 32-byte identifier from a small integer, for tests
/// that just need "some identifier, distinguishable from another one".
pub fn id(n: u8) -> Identifier {
    let mut bytes = [0u8; 32];
    bytes[31] = n;
    Identifier::from_bytes(bytes)
}

pub fn send_get(stream: &mut TcpStream, identifier: Identifier, kind: Kind) {
    let mut cmd = Vec::with_capacity(2 + IDENTIFIER_WIDTH);
    cmd.extend_from_slice(&[opcode::GET, kind.as_byte()]);
    cmd.extend_from_slice(&identifier.to_bytes());
    stream.write_all(&cmd).expect("writing get");
}

pub fn send_quit(stream: &mut TcpStream) {
    stream.write_all(&[opcode::QUIT]).expect("writing quit");
}

/// One complete `ts <id> (p<kind><size><payload>)* te` transaction.
pub fn send_put_transaction(stream: &mut TcpStream, identifier: Identifier, payloads: &[(Kind, &[u8])]) {
    let mut cmd = Vec::new();
    cmd.extend_from_slice(&[opcode::TRANSACTION, opcode::TRANSACTION_START]);
    cmd.extend_from_slice(&identifier.to_bytes());
    for (kind, data) in payloads {
        cmd.extend_from_slice(&[opcode::PUT, kind.as_byte()]);
        cmd.extend_from_slice(format_hex(data.len() as u64, SIZE_HEX_WIDTH).as_bytes());
        cmd.extend_from_slice(data);
    }
    cmd.extend_from_slice(&[opcode::TRANSACTION, opcode::TRANSACTION_END]);
    stream.write_all(&cmd).expect("writing put transaction");
}

#[derive(Debug, PartialEq, Eq)]
pub enum GetResponse {
    Hit { kind: Kind, id: Identifier, payload: Vec<u8> },
    Miss { kind: Kind, id: Identifier },
}

pub fn read_get_response(stream: &mut TcpStream) -> GetResponse {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).expect("reading response marker+kind");
    let kind = Kind::try_from(head[1]).expect("valid kind byte");

    match head[0] {
        response::HIT => {
            let mut size_hex = [0u8; SIZE_HEX_WIDTH];
            stream.read_exact(&mut size_hex).expect("reading size field");
            let size = parse_hex_u64(&size_hex).expect("valid size hex") as usize;
            let mut id_bytes = [0u8; IDENTIFIER_WIDTH];
            stream.read_exact(&mut id_bytes).expect("reading id field");
            let mut payload = vec![0u8; size];
            stream.read_exact(&mut payload).expect("reading payload");
            GetResponse::Hit {
                kind,
                id: Identifier::from_bytes(id_bytes),
                payload,
            }
        }
        response::MISS => {
            let mut id_bytes = [0u8; IDENTIFIER_WIDTH];
            stream.read_exact(&mut id_bytes).expect("reading id field");
            GetResponse::Miss {
                kind,
                id: Identifier::from_bytes(id_bytes),
            }
        }
        other => panic!("unexpected response marker byte {other:#04x}"),
    }
}

/// True once the peer has closed the connection (read returns EOF).
pub fn connection_is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(stream.read(&mut buf), Ok(0))
}
