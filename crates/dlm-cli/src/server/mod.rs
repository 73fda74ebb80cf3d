//! HTTP control plane: job management endpoints and the front-end page.

mod handlers;

use axum::http::{header, HeaderValue};
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use dlm_core::JobList;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub jobs: Arc<JobList>,
    /// Directory holding a custom `index.html`.
    pub static_dir: Option<PathBuf>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/index.html", get(handlers::index))
        .route("/progress.json", get(handlers::progress))
        .route("/add_task", post(handlers::add_task))
        .route("/start_task", post(handlers::start_task))
        .route("/stop_task", post(handlers::stop_task))
        .route("/remove_task", post(handlers::remove_task))
        .route("/start_all_task", post(handlers::start_all_task))
        .route("/stop_all_task", post(handlers::stop_all_task))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

async fn allow_any_origin(mut res: Response) -> Response {
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    res
}
