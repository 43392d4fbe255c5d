use prometheus::{TextEncoder, Encoder, Registry, IntCounter, IntCounterVec, IntGauge, HistogramVec, opts};
use once_cell::sync::Lazy;
use axum::{response::IntoResponse, http::StatusCode};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("http_requests_total", "HTTP request count"), &["method", "path", "status"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        prometheus::HistogramOpts::new("http_request_duration_seconds", "HTTP request duration"),
        &["method", "path"],
    ).unwrap();
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub static DB_POOL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("db_pool_size", "Connections currently open").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});
pub static DB_POOL_IDLE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("db_pool_idle", "Idle connections in pool").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static AUTH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("auth_failures_total", "Rejected authentication attempts").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static FILE_UPLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("file_upload_bytes_total", "Bytes forwarded to the pinning gateway").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static DISPUTES_RESOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(opts!("disputes_resolved_total", "Dispute resolutions"), &["outcome"]).unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

/// Collapse UUID and numeric path segments so metric labels stay low-cardinality.
pub fn normalize_path(path: &str) -> String {
    let mut out = Vec::new();
    for seg in path.split('/') {
        if seg.is_empty() { out.push(String::new()); continue; }
        let is_id = seg.len() == 36 && seg.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
            || seg.chars().all(|c| c.is_ascii_digit())
            || (seg.starts_with("0x") && seg.len() == 42)
            || seg.starts_with("Qm") || seg.starts_with("bafy");
        out.push(if is_id { ":id".to_string() } else { seg.to_string() });
    }
    out.join("/")
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() { return StatusCode::INTERNAL_SERVER_ERROR.into_response(); }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

#[cfg(test)]
mod tests {
    use super::normalize_path;

    #[test]
    fn normalize_collapses_ids() {
        assert_eq!(normalize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000"), "/api/jobs/:id");
        assert_eq!(normalize_path("/api/contracts/jobs/42"), "/api/contracts/jobs/:id");
        assert_eq!(normalize_path("/api/users/0x00000000000000000000000000000000000000aa"), "/api/users/:id");
        assert_eq!(normalize_path("/api/files/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"), "/api/files/:id");
        assert_eq!(normalize_path("/api/jobs"), "/api/jobs");
    }
}
