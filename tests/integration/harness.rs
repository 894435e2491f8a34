//! Spawns a real `kilnd` binary (via `CARGO_BIN_EXE_kilnd`) bound to
//! ephemeral ports, so these tests exercise the actual process and wire
//! format rather than calling library code in-process.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// A `kilnd` process listening on one or more `namespace:port` pairs.
/// Killed on drop.
pub struct Daemon {
    child: Child,
    ports: Vec<(String, u16)>,
}

/// Reserve a port the OS reports as free right now. There is an inherent
/// race between releasing it here and `kilnd` binding it, but it's the
/// same trick `cargo test`'s own ecosystem uses for ephemeral test ports
/// and in practice never collides under this suite's concurrency.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("binding ephemeral port")
        .local_addr()
        .expect("reading local addr")
        .port()
}

impl Daemon {
    /// Spawn `kilnd` with one namespace per `(namespace, port)` pair, using
    /// an in-memory backend with a generous quota.
    pub fn spawn(namespaces: &[(&str, u16)]) -> Self {
        Self::spawn_with_quota(namespaces, "64MiB")
    }

    /// Like [`Daemon::spawn`] but with a caller-chosen quota, for exercising
    /// over-quota behaviour deterministically.
    pub fn spawn_with_quota(namespaces: &[(&str, u16)], quota: &str) -> Self {
        let port_flag = namespaces
            .iter()
            .map(|(ns, port)| format!("{ns}:{port}"))
            .collect::<Vec<_>>()
            .join(",");

        let child = Command::new(env!("CARGO_BIN_EXE_kilnd"))
            .args(["--cache-backend", "memory"])
            .args(["--quota", quota])
            .args(["--port", &port_flag])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawning kilnd");

        let daemon = Daemon {
            child,
            ports: namespaces.iter().map(|(ns, port)| (ns.to_string(), *port)).collect(),
        };
        for (_, port) in &daemon.ports {
            daemon.wait_until_listening(*port);
        }
        daemon
    }

    fn wait_until_listening(&self, port: u16) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        while Instant::now() < deadline {
            if TcpStream::connect(addr).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("kilnd never started listening on port {port}");
    }

    /// Open a raw TCP connection to one of this daemon's ports, without
    /// performing the handshake.
    pub fn raw_connect(&self, port: u16) -> TcpStream {
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let stream = TcpStream::connect(addr).expect("connecting to kilnd");
        stream.set_nodelay(true).expect("setting nodelay");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("setting read timeout");
        stream
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
