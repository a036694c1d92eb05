//! HTTP surface: job intake, status polling, completion callbacks, and health.

pub mod api;
mod middleware;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware};
use tokio::sync::watch;

use crate::application::{delivery::WorkerState, jobs::JobDispatcher};

pub use middleware::RequestContext;

/// State shared by every handler.
#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: JobDispatcher,
    pub delivery: watch::Receiver<WorkerState>,
    pub url_prefix: Arc<str>,
}

pub fn build_router(state: HttpState, max_request_bytes: usize) -> Router {
    api::build_api_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
