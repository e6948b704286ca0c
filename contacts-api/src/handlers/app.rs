use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use contacts_common::pipeline::Pipeline;
use contacts_common::store::ContactStore;

use super::{fetch, submit};

/// Shared by every handler: the ingestion pipeline and the store it writes to.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn ContactStore>,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(store: Arc<dyn ContactStore>, upload_dir: PathBuf) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(store.clone())),
            store,
            upload_dir: Arc::new(upload_dir),
        }
    }
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index))
        .route(
            "/submit",
            routing::post(submit::post_submit)
                .with_state(state.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/fetch", routing::get(fetch::get_fetch).with_state(state))
        .layer(CorsLayer::permissive())
}

pub async fn index() -> &'static str {
    "contacts api"
}
