//! Command-line surface for `kilnd`.
//!
//! A hand-rolled flag parser can't express a repeatable, comma-separated
//! `--port` list cleanly, so — following the wider pack's own reach for
//! `clap` wherever flags stop being trivial — the daemon's flags are a
//! `clap` derive struct instead of the teacher's TOML-plus-env-overrides
//! `SummitConfig`; there's no config file here, only flags.

use clap::Parser;

use kiln_core::config::{parse_ports, parse_quota, CacheBackendKind, ConfigError, PortNamespace};

#[derive(Debug, Parser)]
#[command(name = "kilnd", about = "Kiln content-addressed asset cache daemon")]
pub struct Args {
    /// Which cache backend to construct: fs, memory, or nop.
    #[arg(long, default_value = "memory")]
    pub cache_backend: CacheBackendKind,

    /// Root directory for the fs backend. Required when --cache-backend=fs.
    #[arg(long)]
    pub cache_path: Option<std::path::PathBuf>,

    /// Byte quota for the fs/memory backends, e.g. `10GB`, `512MiB`, `1024`.
    #[arg(long, default_value = "1GB", value_parser = parse_quota)]
    pub quota: u64,

    /// Address the HTTP admin/metrics endpoint binds to. Omit to disable it.
    #[arg(long)]
    pub http_address: Option<std::net::SocketAddr>,

    /// One or more `namespace:port` pairs (or a bare port, whose namespace
    /// defaults to the port's own decimal text), comma-separated or
    /// repeated. Each pair gets its own TCP listener and key-space.
    #[arg(long, value_parser = parse_ports, required = true)]
    pub port: Vec<Vec<PortNamespace>>,

    /// Increase log verbosity. Repeatable: -v, -vv, -vvv.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn ports(&self) -> Vec<PortNamespace> {
        self.port.iter().flatten().cloned().collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_backend == CacheBackendKind::Fs && self.cache_path.is_none() {
            return Err(ConfigError::MissingCachePath);
        }
        Ok(())
    }
}
