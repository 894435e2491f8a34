//! The admin HTTP endpoint — `/metrics` (Prometheus text) and `/info`
//! (JSON snapshot of what's running), grounded on the teacher's
//! `summitd::status::serve`. Only started when `--http-address` is given;
//! it is not the cache protocol, just an operator-facing side door.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;

use kiln_core::config::PortNamespace;

#[derive(Clone)]
pub struct AdminState {
    pub prometheus: PrometheusHandle,
    pub backend_kind: &'static str,
    pub ports: Arc<Vec<PortNamespace>>,
}

#[derive(Serialize)]
struct InfoResponse {
    backend: &'static str,
    namespaces: Vec<NamespaceInfo>,
}

#[derive(Serialize)]
struct NamespaceInfo {
    namespace: String,
    port: u16,
}

async fn handle_metrics(State(state): State<AdminState>) -> String {
    state.prometheus.render()
}

async fn handle_info(State(state): State<AdminState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        backend: state.backend_kind,
        namespaces: state
            .ports
            .iter()
            .map(|p| NamespaceInfo {
                namespace: p.namespace.clone(),
                port: p.port,
            })
            .collect(),
    })
}

pub async fn serve(addr: SocketAddr, state: AdminState) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/info", get(handle_info))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
