//! Small parsers shared by the daemon's CLI and the load generator's CLI.
//!
//! Unlike the teacher's `SummitConfig` (a TOML file plus env-var overrides),
//! this system's configuration surface is entirely command-line flags — see
//! SPEC_FULL.md §4.8 — so there is no file format to own here, only the
//! value parsers `clap` calls into for the handful of non-trivial flags.

use std::str::FromStr;

use thiserror::Error;

/// Which `Cache` backend the daemon should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Fs,
    Memory,
    Nop,
}

impl FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(CacheBackendKind::Fs),
            "memory" => Ok(CacheBackendKind::Memory),
            "nop" => Ok(CacheBackendKind::Nop),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// One `namespace:port` pair from a `--port` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortNamespace {
    pub namespace: String,
    pub port: u16,
}

/// Parse a single `--port` argument: a comma-separated list of either a
/// bare port number (namespace defaults to the stringified port) or an
/// explicit `namespace:port` pair.
pub fn parse_ports(s: &str) -> Result<Vec<PortNamespace>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_single_port)
        .collect()
}

fn parse_single_port(part: &str) -> Result<PortNamespace, ConfigError> {
    let (namespace, port_str) = match part.split_once(':') {
        Some((ns, port)) => (ns.to_string(), port),
        None => (part.to_string(), part),
    };
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ConfigError::BadPort(part.to_string()))?;
    Ok(PortNamespace { namespace, port })
}

/// Parse a human-readable size (`10GB`, `1TiB`, a bare integer of bytes, …)
/// into a byte count.
pub fn parse_quota(s: &str) -> Result<u64, ConfigError> {
    s.parse::<bytesize::ByteSize>()
        .map(|b| b.0)
        .map_err(|_| ConfigError::BadQuota(s.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown cache backend: {0:?} (expected fs, memory, or nop)")]
    UnknownBackend(String),
    #[error("invalid port in '{0}'")]
    BadPort(String),
    #[error("invalid quota size '{0}'")]
    BadQuota(String),
    #[error("--cache-path is required when --cache-backend=fs")]
    MissingCachePath,
}
