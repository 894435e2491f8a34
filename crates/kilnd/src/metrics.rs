//! Installs the process-wide Prometheus recorder `metrics::counter!` and
//! friends publish into, anywhere in `kilnd` or `kiln-cache`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn install() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}
