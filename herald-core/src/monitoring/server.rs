//! HTTP server for Prometheus metrics export
//!
//! Serves `/metrics` (text exposition format) and `/health` (JSON produced by
//! an optional health probe, typically the engine's state and counters).

use super::MetricsRegistry;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Produces the `/health` body
pub type HealthProbe = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:9090")
    pub listen_addr: SocketAddr,
    /// Path to serve metrics (default: "/metrics")
    pub metrics_path: String,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// HTTP server for Prometheus metrics
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: MetricsRegistry,
    health: Option<HealthProbe>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: MetricsRegistry) -> Self {
        Self {
            config,
            registry,
            health: None,
        }
    }

    pub fn with_health_probe(mut self, probe: HealthProbe) -> Self {
        self.health = Some(probe);
        self
    }

    /// Accept connections until `cancel` fires
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", self.config.listen_addr))?;

        info!(
            "Metrics server listening on http://{}{}",
            self.config.listen_addr, self.config.metrics_path
        );

        let router = Arc::new(Router {
            registry: self.registry,
            metrics_path: self.config.metrics_path,
            health: self.health,
        });

        loop {
            let (stream, remote_addr) = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Metrics server stopping");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let router = Arc::clone(&router);
                    async move { Ok::<_, hyper::Error>(router.route(req.method().as_str(), req.uri().path())) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }
}

struct Router {
    registry: MetricsRegistry,
    metrics_path: String,
    health: Option<HealthProbe>,
}

impl Router {
    fn route(&self, method: &str, path: &str) -> Response<Full<Bytes>> {
        debug!("Metrics request: {} {}", method, path);

        if path == "/health" || path == "/healthz" {
            let body = match &self.health {
                Some(probe) => probe().to_string(),
                None => r#"{"status":"ok"}"#.to_string(),
            };
            return respond(StatusCode::OK, "application/json", body);
        }

        if path == self.metrics_path {
            return match self.registry.render() {
                Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        format!("Error: {}", e),
                    )
                }
            };
        }

        if path == "/" {
            let help = format!(
                "Herald alerting metrics\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Health check\n",
                self.metrics_path
            );
            return respond(StatusCode::OK, "text/plain", help);
        }

        warn!("Unknown metrics endpoint requested: {}", path);
        respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
