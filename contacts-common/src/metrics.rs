use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const ROWS_PARSED: &str = "contacts_rows_parsed_total";
pub const ROWS_REJECTED: &str = "contacts_rows_rejected_total";
pub const RECORDS_INSERTED: &str = "contacts_records_inserted_total";
pub const RECORDS_UPDATED: &str = "contacts_records_updated_total";
pub const INSERT_CHUNKS: &str = "contacts_insert_chunks_total";
pub const UPDATE_CHUNKS: &str = "contacts_update_chunks_total";
pub const SUBMISSIONS: &str = "contacts_submissions_total";
pub const SUBMIT_DURATION: &str = "contacts_submit_duration_seconds";
pub const DB_QUERY_DURATION: &str = "contacts_db_query_duration_seconds";

/// Add the `/metrics` endpoint to `router` and track every route's HTTP metrics.
pub fn setup_metrics_routes(router: Router) -> Router {
    let recorder_handle = setup_metrics_recorder();

    router
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
        .layer(axum::middleware::from_fn(track_metrics))
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)
        .expect("buckets are not empty")
        .install_recorder()
        .expect("metrics recorder is installed once per process")
}

/// Middleware to record some common HTTP metrics
/// Someday tower-http might provide a metrics middleware: https://github.com/tower-rs/tower-http/issues/57
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
