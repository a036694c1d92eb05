pub mod error;
pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};

use super::HttpState;

pub fn build_api_router() -> Router<HttpState> {
    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/status/{job_id}", get(handlers::job_status))
        .route("/api/notify-file-ready", post(handlers::notify_file_ready))
        .route("/api/health", get(handlers::health))
}
