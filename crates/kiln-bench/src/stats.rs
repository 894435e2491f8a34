//! Latency/throughput aggregation and the final stdout report.

use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionSample {
    pub kind: ConnectionKind,
    pub elapsed: Duration,
    pub ops: u64,
    pub bytes: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    #[default]
    AliveCheck,
    GetBurst,
    PutBurst,
}

#[derive(Default)]
pub struct Aggregator {
    alive_checks: Vec<Duration>,
    get_bursts: Vec<Duration>,
    put_bursts: Vec<Duration>,
    total_ops: u64,
    total_bytes: u64,
}

impl Aggregator {
    pub fn record(&mut self, sample: ConnectionSample) {
        match sample.kind {
            ConnectionKind::AliveCheck => self.alive_checks.push(sample.elapsed),
            ConnectionKind::GetBurst => self.get_bursts.push(sample.elapsed),
            ConnectionKind::PutBurst => self.put_bursts.push(sample.elapsed),
        }
        self.total_ops += sample.ops;
        self.total_bytes += sample.bytes;
    }

    pub fn connections(&self) -> usize {
        self.alive_checks.len() + self.get_bursts.len() + self.put_bursts.len()
    }

    pub fn report(&self, wall_clock: Duration) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "connections: {} ({} alive-check, {} get-burst, {} put-burst)\n",
            self.connections(),
            self.alive_checks.len(),
            self.get_bursts.len(),
            self.put_bursts.len()
        ));
        out.push_str(&format!(
            "operations: {} total ({:.1}/s), {} bytes transferred\n",
            self.total_ops,
            self.total_ops as f64 / wall_clock.as_secs_f64().max(1e-9),
            self.total_bytes
        ));
        out.push_str(&format!("wall clock: {:.3}s\n", wall_clock.as_secs_f64()));
        out.push_str(&latency_line("alive-check connection", &self.alive_checks));
        out.push_str(&latency_line("get-burst connection", &self.get_bursts));
        out.push_str(&latency_line("put-burst connection", &self.put_bursts));
        out
    }
}

fn latency_line(label: &str, samples: &[Duration]) -> String {
    if samples.is_empty() {
        return format!("{label}: no samples\n");
    }
    let mut sorted = samples.to_vec();
    sorted.sort();
    let p = |q: f64| -> Duration {
        let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
        sorted[idx]
    };
    format!(
        "{label}: n={} p50={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms\n",
        sorted.len(),
        p(0.50).as_secs_f64() * 1000.0,
        p(0.95).as_secs_f64() * 1000.0,
        p(0.99).as_secs_f64() * 1000.0,
        sorted.last().unwrap().as_secs_f64() * 1000.0,
    )
}
