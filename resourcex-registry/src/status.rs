//! Status service: `/metrics`, `/livez`, `/readyz`.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use resourcex_util::metrics::{new_registry, HasRegistry};

const METRICS_PREFIX: &str = "resourcex_registry";

/// Request counters and store-size gauges, registered into a custom
/// Prometheus registry carrying the `resourcex_registry` prefix.
pub struct Metrics {
    registry: Registry,
    pub publish_total: IntCounterVec,
    pub fetch_total: IntCounterVec,
    pub delete_total: IntCounterVec,
    pub search_total: IntCounterVec,
    manifest_count: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Metrics> {
        let registry = new_registry(METRICS_PREFIX)?;

        let publish_total = IntCounterVec::new(
            Opts::new("publish_total", "Publish requests by outcome"),
            &["outcome"],
        )?;
        let fetch_total = IntCounterVec::new(
            Opts::new("fetch_total", "Resource/content fetch requests by outcome"),
            &["outcome"],
        )?;
        let delete_total = IntCounterVec::new(
            Opts::new("delete_total", "Delete requests by outcome"),
            &["outcome"],
        )?;
        let search_total = IntCounterVec::new(
            Opts::new("search_total", "Search requests by outcome"),
            &["outcome"],
        )?;
        let manifest_count = IntGauge::with_opts(Opts::new("manifest_count", "Stored manifest entries"))?;

        registry.register(Box::new(publish_total.clone()))?;
        registry.register(Box::new(fetch_total.clone()))?;
        registry.register(Box::new(delete_total.clone()))?;
        registry.register(Box::new(search_total.clone()))?;
        registry.register(Box::new(manifest_count.clone()))?;

        Ok(Metrics {
            registry,
            publish_total,
            fetch_total,
            delete_total,
            search_total,
            manifest_count,
        })
    }

    /// Re-sample the stored manifest count on each `/metrics` scrape, since
    /// entries change through several code paths (publish, delete, clear).
    pub fn observe_manifest_count(&self, state: &AppState) {
        self.manifest_count.set(state.cas.list(None, None, 0).len() as i64);
    }
}

impl HasRegistry for Metrics {
    fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub async fn serve_metrics(metrics: web::Data<Metrics>, state: web::Data<AppState>) -> actix_web::Result<HttpResponse> {
    metrics.observe_manifest_count(&state);
    resourcex_util::metrics::serve(metrics).await
}

/// Liveness: the process is up and serving requests.
pub async fn serve_livez() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Readiness: the CAS data root is still accessible.
pub async fn serve_readyz(state: web::Data<AppState>) -> HttpResponse {
    if state.is_ready() {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::ServiceUnavailable().finish()
    }
}
