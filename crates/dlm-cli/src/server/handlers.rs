//! Request handlers. Bodies are read raw and parsed here so that any malformed
//! body is a plain-text 500, matching the rest of the error responses.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use dlm_core::jobs::SegmentErrors;
use dlm_core::{DlmError, JobList, JobProgress, NewJob};
use std::sync::Arc;

use super::AppState;

const EMBEDDED_INDEX: &str = include_str!("../../static/index.html");

/// Plain-text error response.
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DlmError> for ApiError {
    fn from(e: DlmError) -> Self {
        match e {
            DlmError::IndexOutOfRange { .. } => Self::bad_request(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(status = self.status.as_u16(), "{}", self.message);
        (self.status, self.message).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn ok() -> Json<&'static str> {
    Json("ok")
}

/// Runs a blocking job-list operation off the async workers.
async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&JobList) -> T + Send + 'static,
    T: Send + 'static,
{
    let jobs = Arc::clone(&state.jobs);
    tokio::task::spawn_blocking(move || f(&jobs))
        .await
        .map_err(|e| ApiError::internal(format!("engine task failed: {}", e)))
}

/// Parses a JSON integer job index. Negative ids are out of range.
fn parse_index(state: &AppState, body: &[u8]) -> ApiResult<usize> {
    let id: i64 = serde_json::from_slice(body)
        .map_err(|e| ApiError::internal(format!("invalid job id: {}", e)))?;
    usize::try_from(id).map_err(|_| {
        ApiError::bad_request(format!(
            "error: id {} is out of jobs list (len {})",
            id,
            state.jobs.len()
        ))
    })
}

fn describe(errors: &SegmentErrors) -> String {
    errors
        .iter()
        .map(|(segment, e)| format!("segment {}: {}", segment, e))
        .collect::<Vec<_>>()
        .join("; ")
}

pub(super) async fn root() -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, "/index.html")],
    )
        .into_response()
}

pub(super) async fn index(State(state): State<Arc<AppState>>) -> Response {
    if let Some(dir) = &state.static_dir {
        let path = dir.join("index.html");
        match tokio::fs::read(&path).await {
            Ok(content) => {
                return ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], content)
                    .into_response()
            }
            Err(e) => tracing::warn!(
                path = %path.display(),
                "start page not readable ({}); serving embedded page",
                e
            ),
        }
    }
    Html(EMBEDDED_INDEX).into_response()
}

pub(super) async fn progress(State(state): State<Arc<AppState>>) -> Json<Vec<JobProgress>> {
    Json(state.jobs.progress())
}

pub(super) async fn add_task(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let job: NewJob = serde_json::from_slice(&body)
        .map_err(|e| ApiError::internal(format!("invalid add_task body: {}", e)))?;
    tracing::info!(url = %job.url, parts = ?job.part_count, "add_task");
    let id = blocking(&state, move |jobs| jobs.add(&job)).await??;
    tracing::debug!(id, "job added");
    Ok(ok())
}

pub(super) async fn start_task(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let id = parse_index(&state, &body)?;
    let errors = blocking(&state, move |jobs| jobs.start(id)).await??;
    if !errors.is_empty() {
        return Err(ApiError::bad_request(describe(&errors)));
    }
    Ok(ok())
}

pub(super) async fn stop_task(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let id = parse_index(&state, &body)?;
    let errors = blocking(&state, move |jobs| jobs.stop(id)).await??;
    if !errors.is_empty() {
        return Err(ApiError::internal(describe(&errors)));
    }
    Ok(ok())
}

/// Removes the job even if some of its segments are slow to stop; those are
/// logged by the job list.
pub(super) async fn remove_task(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<&'static str>> {
    let id = parse_index(&state, &body)?;
    blocking(&state, move |jobs| jobs.remove(id)).await??;
    Ok(ok())
}

pub(super) async fn start_all_task(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<&'static str>> {
    blocking(&state, |jobs| jobs.start_all_jobs()).await?;
    Ok(ok())
}

pub(super) async fn stop_all_task(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<&'static str>> {
    blocking(&state, |jobs| jobs.stop_all_jobs()).await?;
    Ok(ok())
}
