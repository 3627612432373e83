use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;

/// What the exporter knows about the process it runs in
#[derive(Clone, Debug, Serialize)]
pub struct ExporterInfo {
    pub service: &'static str,
    /// Label of the attached event store, e.g. `"redis"`
    pub store_backend: &'static str,
}

impl ExporterInfo {
    pub fn new(store_backend: &'static str) -> Self {
        Self {
            service: "event-mediator",
            store_backend,
        }
    }
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    #[serde(flatten)]
    info: &'a ExporterInfo,
}

/// Serve `/metrics` and `/health` until the server stops.
///
/// actix-web runs its own system, so call this from a dedicated thread and
/// runtime rather than from the mediator's runtime.
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    info: ExporterInfo,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(
        port = port,
        store_backend = info.store_backend,
        "Serving mediator metrics on /metrics"
    );

    HttpServer::new(move || {
        App::new().configure(routes(registry.clone(), info.clone()))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn routes(registry: Arc<Registry>, info: ExporterInfo) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(registry))
            .app_data(web::Data::new(info))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler));
    }
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

async fn health_handler(info: web::Data<ExporterInfo>) -> impl Responder {
    HttpResponse::Ok().json(Health {
        status: "healthy",
        info: info.get_ref(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MediatorMetrics;
    use actix_web::test;

    #[actix_web::test]
    async fn test_health_reports_store_backend() {
        let registry = Arc::new(Registry::new());
        let app = test::init_service(
            App::new().configure(routes(registry, ExporterInfo::new("postgres"))),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "event-mediator");
        assert_eq!(body["store_backend"], "postgres");
    }

    #[actix_web::test]
    async fn test_metrics_exposes_mediator_counters() {
        let metrics = MediatorMetrics::new().unwrap();
        metrics.record_no_handlers("sku.unregistered");

        let app = test::init_service(App::new().configure(routes(
            Arc::new(metrics.registry().clone()),
            ExporterInfo::new("memory"),
        )))
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8_lossy(&body);

        assert!(text.contains("mediator_no_handlers_total{event_name=\"sku.unregistered\"} 1"));
    }
}
