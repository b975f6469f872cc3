//! Metrics helpers.

use actix_web::HttpResponse;
use prometheus::Registry;

/// For types that own a static metrics [`Registry`].
pub trait HasRegistry {
    /// Borrow the registry.
    fn registry(&self) -> &Registry;
}

/// Create a custom Prometheus registry with the given metric name prefix.
pub fn new_registry(prefix: impl Into<String>) -> anyhow::Result<Registry> {
    Registry::new_custom(Some(prefix.into()), None)
        .map_err(|e| anyhow::anyhow!("could not create metrics registry: {}", e))
}

/// Serve a metrics request in Prometheus textual format.
pub async fn serve<T>(app_data: actix_web::web::Data<T>) -> actix_web::Result<HttpResponse>
where
    T: 'static + HasRegistry,
{
    use prometheus::Encoder;

    let metrics = app_data.registry().gather();
    let mut buf = Vec::new();
    let tenc = prometheus::TextEncoder::new();
    tenc.encode(&metrics, &mut buf)
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().body(buf))
}
