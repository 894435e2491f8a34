//! End-to-end tests against a real `kilnd` process, driven byte-for-byte
//! over raw TCP connections. Each test spawns its own daemon on an
//! ephemeral port so tests stay independent under `cargo test`'s default
//! parallelism.

mod harness;
mod wire;

use kiln_core::Kind;

use harness::{free_port, Daemon};
use wire::{
    connection_is_closed, handshake, handshake_raw, id, read_get_response, send_get, send_put_transaction, send_quit,
    GetResponse,
};

#[test]
fn handshake_accepts_all_tolerated_short_forms() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);

    for text in ["fe", "0fe", "000000fe", "00000fe"] {
        let mut stream = daemon.raw_connect(port);
        let echoed = handshake_raw(&mut stream, text.as_bytes()).expect("server closed during handshake");
        assert_eq!(&echoed, b"000000fe", "short form {text:?} should echo as 8 hex chars");
    }
}

#[test]
fn handshake_rejects_non_hex_and_closes() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);

    let echoed = handshake_raw(&mut stream, b"zzzzzzzz");
    assert_eq!(echoed, Some(*b"00000000"));
    assert!(connection_is_closed(&mut stream), "server should close after a rejected handshake");
}

#[test]
fn handshake_rejects_unsupported_version_and_closes() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);

    let echoed = handshake_raw(&mut stream, b"000000aa");
    assert_eq!(echoed, Some(*b"00000000"));
    assert!(connection_is_closed(&mut stream), "server should close after an unsupported version");
}

#[test]
fn get_on_never_written_key_is_a_miss() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    let identifier = id(1);
    send_get(&mut stream, identifier, Kind::Asset);
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Miss { kind: Kind::Asset, id: identifier }
    );
}

#[test]
fn put_then_get_round_trips_a_single_kind() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    let identifier = id(1);
    send_put_transaction(&mut stream, identifier, &[(Kind::Info, b"info")]);
    send_get(&mut stream, identifier, Kind::Info);

    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Info, id: identifier, payload: b"info".to_vec() }
    );
}

#[test]
fn put_then_get_round_trips_multiple_kinds_in_one_transaction() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    let identifier = id(2);
    send_put_transaction(
        &mut stream,
        identifier,
        &[(Kind::Info, b"info" as &[u8]), (Kind::Asset, b"asset" as &[u8])],
    );
    send_get(&mut stream, identifier, Kind::Info);
    send_get(&mut stream, identifier, Kind::Asset);

    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Info, id: identifier, payload: b"info".to_vec() }
    );
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Asset, id: identifier, payload: b"asset".to_vec() }
    );
}

/// A GET pipelined ahead of the transaction that will satisfy it must see
/// a miss; the same GET issued after the commit must see the hit. Response
/// order must match request order.
#[test]
fn get_ordering_is_preserved_around_a_commit() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    let identifier = id(3);
    send_get(&mut stream, identifier, Kind::Info);
    send_put_transaction(&mut stream, identifier, &[(Kind::Info, b"info")]);
    send_get(&mut stream, identifier, Kind::Info);

    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Miss { kind: Kind::Info, id: identifier }
    );
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Info, id: identifier, payload: b"info".to_vec() }
    );
}

#[test]
fn put_outside_a_transaction_is_fatal() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    use std::io::Write;
    let mut cmd = vec![b'p', Kind::Info.as_byte()];
    cmd.extend_from_slice(b"0000000000000001");
    cmd.push(b'x');
    stream.write_all(&cmd).expect("writing bare put");

    assert!(connection_is_closed(&mut stream), "a put outside a transaction should close the connection");
}

#[test]
fn reopening_an_already_open_transaction_is_fatal() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    use std::io::Write;
    let mut cmd = vec![b't', b's'];
    cmd.extend_from_slice(&id(3).to_bytes());
    cmd.push(b't');
    cmd.push(b's');
    cmd.extend_from_slice(&id(4).to_bytes());
    stream.write_all(&cmd).expect("writing nested transaction start");

    assert!(connection_is_closed(&mut stream), "a second ts before te should close the connection");
}

#[test]
fn quit_closes_the_connection_cleanly() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    send_quit(&mut stream);
    assert!(connection_is_closed(&mut stream));
}

#[test]
fn namespaces_do_not_share_keyspace() {
    let port_a = free_port();
    let port_b = free_port();
    let daemon = Daemon::spawn(&[("alpha", port_a), ("beta", port_b)]);

    let identifier = id(1);
    let mut a = daemon.raw_connect(port_a);
    handshake(&mut a);
    send_put_transaction(&mut a, identifier, &[(Kind::Info, b"alpha-data")]);
    send_get(&mut a, identifier, Kind::Info);
    assert_eq!(
        read_get_response(&mut a),
        GetResponse::Hit { kind: Kind::Info, id: identifier, payload: b"alpha-data".to_vec() }
    );

    let mut b = daemon.raw_connect(port_b);
    handshake(&mut b);
    send_get(&mut b, identifier, Kind::Info);
    assert_eq!(
        read_get_response(&mut b),
        GetResponse::Miss { kind: Kind::Info, id: identifier },
        "a write in one namespace must not be visible from another"
    );
}

/// Pipeline 10,000 GET misses before reading a single response byte, then
/// confirm all 10,000 responses arrive in order and the connection is
/// still usable afterwards for an ordinary put+get round trip.
#[test]
fn ten_thousand_pipelined_gets_arrive_in_order_and_connection_survives() {
    let port = free_port();
    let daemon = Daemon::spawn(&[("default", port)]);
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    const COUNT: usize = 10_000;
    let ids: Vec<_> = (0..COUNT).map(|i| id((i % 256) as u8)).collect();
    for identifier in &ids {
        send_get(&mut stream, *identifier, Kind::Resource);
    }
    for identifier in &ids {
        assert_eq!(
            read_get_response(&mut stream),
            GetResponse::Miss { kind: Kind::Resource, id: *identifier }
        );
    }

    let identifier = id(200);
    send_put_transaction(&mut stream, identifier, &[(Kind::Resource, b"after-the-flood")]);
    send_get(&mut stream, identifier, Kind::Resource);
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Resource, id: identifier, payload: b"after-the-flood".to_vec() }
    );
}

/// A commit that fails (here: the entry is larger than the whole cache's
/// quota) must be logged and absorbed, not close the connection — the next
/// `Get` on the same connection still works, and the failed write never
/// became visible.
#[test]
fn a_commit_that_exceeds_quota_does_not_close_the_connection() {
    let port = free_port();
    let daemon = Daemon::spawn_with_quota(&[("default", port)], "8B");
    let mut stream = daemon.raw_connect(port);
    handshake(&mut stream);

    let identifier = id(1);
    send_put_transaction(&mut stream, identifier, &[(Kind::Asset, b"this payload is way over quota")]);
    send_get(&mut stream, identifier, Kind::Asset);
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Miss { kind: Kind::Asset, id: identifier },
        "a failed commit must not make its data visible"
    );

    let other = id(2);
    send_put_transaction(&mut stream, other, &[(Kind::Asset, b"fits")]);
    send_get(&mut stream, other, Kind::Asset);
    assert_eq!(
        read_get_response(&mut stream),
        GetResponse::Hit { kind: Kind::Asset, id: other, payload: b"fits".to_vec() },
        "the connection must still work after an earlier commit failure"
    );
}
