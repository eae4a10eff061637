//! ABOUTME: Metric registry and the pull-based snapshot exporter
//! ABOUTME: Serves gauges, health and readiness over HTTP for Prometheus scrapes

use actix_web::{
    dev::{ServiceRequest, ServiceResponse},
    middleware::Logger,
    web, App, HttpResponse, HttpServer, Result as ActixResult,
};
use serde_json::json;
use sm_core::Result;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub mod registry;

pub use registry::{GaugeHandle, GaugeSample, GaugeSpec, LabelSet, Labels, MetricRegistry};

/// Content type of the Prometheus text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Readiness gate that can be toggled to indicate service readiness
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    ready: Arc<AtomicBool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Gate that stays closed until [`set_ready`](Self::set_ready) is called
    pub fn not_ready() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state for the exporter endpoints
#[derive(Debug, Clone)]
pub struct ObsState {
    pub readiness: ReadinessGate,
    pub registry: MetricRegistry,
    /// Route serving the metrics snapshot, with leading slash
    pub scrape_path: String,
}

impl ObsState {
    pub fn new(registry: MetricRegistry) -> Self {
        Self {
            readiness: ReadinessGate::new(),
            registry,
            scrape_path: "/metrics".to_string(),
        }
    }

    pub fn with_scrape_path(mut self, path: &str) -> Self {
        self.scrape_path = format!("/{}", path.trim_start_matches('/'));
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessGate) -> Self {
        self.readiness = readiness;
        self
    }
}

/// Health endpoint handler
async fn health() -> ActixResult<HttpResponse> {
    tracing::debug!("Health check requested");
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}

/// Readiness endpoint handler
async fn readiness(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    let is_ready = state.readiness.is_ready();
    tracing::debug!("Readiness check requested, ready: {}", is_ready);

    if is_ready {
        Ok(HttpResponse::Ok().json(json!({
            "status": "ready"
        })))
    } else {
        Ok(HttpResponse::ServiceUnavailable().json(json!({
            "status": "not ready"
        })))
    }
}

/// Snapshot endpoint handler
async fn metrics(state: web::Data<ObsState>) -> ActixResult<HttpResponse> {
    tracing::debug!("Metrics scrape requested");

    match state.registry.encode() {
        Ok(metrics_text) => {
            tracing::debug!("Metrics encoded successfully, {} bytes", metrics_text.len());
            Ok(HttpResponse::Ok()
                .content_type(TEXT_CONTENT_TYPE)
                .body(metrics_text))
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to encode metrics"
            })))
        }
    }
}

/// Create exporter service factory
pub fn create_service(
    state: ObsState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let scrape_path = state.scrape_path.clone();

    App::new()
        .app_data(web::Data::new(state))
        .wrap(Logger::default())
        .service(
            web::scope("")
                .route("/healthz", web::get().to(health))
                .route("/readyz", web::get().to(readiness))
                .route(&scrape_path, web::get().to(metrics)),
        )
}

/// Start the exporter and serve until the server stops
pub async fn start_server(bind_addr: &str, state: ObsState) -> Result<()> {
    tracing::info!(
        bind_addr = %bind_addr,
        path = %state.scrape_path,
        "Starting metrics exporter"
    );

    HttpServer::new(move || create_service(state.clone()))
        .bind(bind_addr)
        .map_err(|e| sm_core::Error::Config(format!("Failed to bind server: {}", e)))?
        .run()
        .await
        .map_err(|e| sm_core::Error::External(format!("Server error: {}", e)))?;

    Ok(())
}
