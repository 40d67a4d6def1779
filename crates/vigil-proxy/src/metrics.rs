//! Prometheus metrics and health check HTTP server.
//!
//! Counters are recorded unconditionally through the `metrics` crate's
//! global recorder; without one installed they are no-ops. When
//! `--metrics-port` is set, `main` installs a prometheus recorder and
//! starts a small HTTP server serving `/metrics` and `/health`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::relay::SessionEnd;
use crate::state::{PrimaryView, Snapshot};

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Installs the prometheus recorder without starting an HTTP server.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Spawns the `/metrics` + `/health` server and the recorder upkeep task.
///
/// A bind failure is logged and the proxy keeps running without the
/// endpoint.
pub fn spawn_http_server(addr: SocketAddr, handle: PrometheusHandle, view: PrimaryView) {
    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            upkeep_handle.run_upkeep();
        }
    });

    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("failed to bind metrics/health server on {addr}: {e}");
                return;
            }
        };
        info!("metrics and health endpoint on http://{addr}");
        serve_http(listener, handle, view).await;
    });
}

/// Serves HTTP/1 requests on an already-bound listener.
pub async fn serve_http(listener: TcpListener, handle: PrometheusHandle, view: PrimaryView) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("metrics listener accept error: {e}");
                continue;
            }
        };

        let handle = handle.clone();
        let view = view.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = route(req.uri().path(), &handle, &view);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("http connection error: {e}");
            }
        });
    }
}

fn route(path: &str, handle: &PrometheusHandle, view: &PrimaryView) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(handle.render()),
        ),
        "/health" => health_response(&view.snapshot()),
        _ => respond(
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"not found"),
        ),
    }
}

/// 200 with the current primary, or 503 while none is known.
fn health_response(snapshot: &Snapshot) -> Response<Full<Bytes>> {
    let (status, code) = match snapshot.primary {
        Some(_) => ("ok", StatusCode::OK),
        None => ("no_primary", StatusCode::SERVICE_UNAVAILABLE),
    };
    let body = serde_json::json!({
        "status": status,
        "primary": snapshot.primary.map(|p| p.to_string()),
        "generation": snapshot.generation,
    });
    respond(code, "application/json", Bytes::from(body.to_string()))
}

fn respond(code: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = code;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// A client was accepted and a session task spawned for it.
#[inline]
pub fn record_session_opened() {
    counter!("vigil_sessions_total").increment(1);
    gauge!("vigil_sessions_active").increment(1.0);
}

/// A session that reached its primary has ended.
#[inline]
pub fn record_session_closed(end: SessionEnd) {
    gauge!("vigil_sessions_active").decrement(1.0);
    if end == SessionEnd::Drained {
        counter!("vigil_sessions_drained_total").increment(1);
    }
}

/// A session ended before relaying anything: no primary, or the dial
/// failed.
#[inline]
pub fn record_session_dial_failure() {
    gauge!("vigil_sessions_active").decrement(1.0);
    counter!("vigil_session_dial_failures_total").increment(1);
}

/// A discovery round found no usable primary.
#[inline]
pub fn record_discovery_failure() {
    counter!("vigil_discovery_failures_total").increment(1);
}

/// The published primary changed and `generation` is now current.
#[inline]
pub fn record_primary_change(generation: u64) {
    counter!("vigil_primary_changes_total").increment(1);
    gauge!("vigil_generation").set(generation as f64);
}
