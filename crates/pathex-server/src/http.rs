//! Thin axum surface over the [`Exporter`] and the [`InteractorService`].

use crate::export::{Endpoint, ExportQuery, ExportedArtifact, Exporter};
use crate::interactors::{InteractorService, SubmissionSummary};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use pathex_cache::Artifact;
use pathex_core::ExportError;
use pathex_gate::CancellationToken;
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

pub struct AppState {
    pub exporter: Arc<Exporter>,
    pub interactors: InteractorService,
    /// Parent of every per-request cancellation token.
    pub shutdown: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.interactors.max_payload_bytes()).unwrap_or(usize::MAX);
    Router::new()
        .route("/exporter/diagram/:file", get(export_diagram))
        .route("/exporter/document/event/:file", get(export_document))
        .route("/exporter/event/:file", get(export_event))
        .route("/interactors/upload/tuple/content", post(upload_content))
        .route("/interactors/upload/tuple/url", post(upload_url))
        .route("/interactors/upload/tuple/form", post(upload_form))
        .route("/interactors/token/:token", get(token_summary))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// JSON error body: `{ "code": ..., "message": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Non-standard "client closed request"; nobody is left to read it.
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        let (status, code) = match &err {
            ExportError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ExportError::Unsupported(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED"),
            ExportError::Unavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ExportError::Cancelled => (
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                "CANCELLED",
            ),
            ExportError::Graph(_) => (StatusCode::SERVICE_UNAVAILABLE, "GRAPH_UNAVAILABLE"),
            ExportError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_FAILURE"),
            ExportError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    quality: Option<String>,
    profile: Option<String>,
    sel: Option<String>,
    flg: Option<String>,
    token: Option<String>,
}

impl ExportParams {
    fn into_query(self) -> Result<ExportQuery, ApiError> {
        let quality = match self.quality.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| ApiError::bad_request(format!("quality {raw:?} is not an integer")))?,
            ),
        };
        Ok(ExportQuery {
            quality,
            profile: self.profile,
            selected: self.sel,
            flagged: self.flg,
            analysis_token: self.token,
        })
    }
}

async fn export_diagram(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    export(&state, Endpoint::Diagram, &file, params).await
}

async fn export_document(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    export(&state, Endpoint::Document, &file, params).await
}

async fn export_event(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    export(&state, Endpoint::Event, &file, params).await
}

async fn export(
    state: &AppState,
    endpoint: Endpoint,
    file: &str,
    params: ExportParams,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let request = state.exporter.parse_request(endpoint, file, &query)?;

    // Cancelled on shutdown, or when this handler is dropped because the client went away.
    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let exported = state.exporter.export(&request, &cancel).await?;
    artifact_response(exported).await
}

async fn artifact_response(exported: ExportedArtifact) -> Result<Response, ApiError> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        exported.file_name
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let cache_status = if exported.cache_hit { "hit" } else { "miss" };
    let len = exported.artifact.len();
    let content_type = exported.content_type();

    let body = match exported.artifact.into_memory() {
        Ok(bytes) => Body::from(bytes),
        Err(artifact) => file_body(artifact).await?,
    };
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::HeaderName::from_static("x-pathex-cache"),
                HeaderValue::from_static(cache_status),
            ),
        ],
        body,
    )
        .into_response())
}

async fn file_body(artifact: Artifact) -> Result<Body, ApiError> {
    let Some(path) = artifact.path() else {
        return Err(ExportError::Internal("artifact has no backing file".to_owned()).into());
    };
    let file = tokio::fs::File::open(path).await.map_err(|err| {
        tracing::error!(
            target: "pathex.http",
            path = %path.display(),
            error = %err,
            "failed to open artifact"
        );
        ApiError::from(ExportError::Internal("failed to open artifact".to_owned()))
    })?;
    Ok(Body::from_stream(ArtifactStream {
        inner: ReaderStream::new(file),
        _artifact: artifact,
    }))
}

/// Streams an artifact file and keeps the artifact alive until the body is dropped, so that
/// ephemeral files are removed only after the response is sent or abandoned.
struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _artifact: Artifact,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitParams {
    name: Option<String>,
}

impl SubmitParams {
    fn name(self) -> Result<String, ApiError> {
        self.name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("query parameter `name` is required"))
    }
}

async fn upload_content(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    body: Bytes,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let name = params.name()?;
    submit_blocking(&state, move |service| service.submit(&name, &body)).await
}

async fn upload_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    body: String,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let name = params.name()?;
    submit_blocking(&state, move |service| {
        let payload = service.fetch_url(&body)?;
        service.submit(&name, &payload)
    })
    .await
}

async fn upload_form(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubmitParams>,
    mut multipart: Multipart,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let name = params.name()?;
    let mut payload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.body_text()))?;
            payload = Some(bytes);
        }
    }
    let payload =
        payload.ok_or_else(|| ApiError::bad_request("multipart field `file` is required"))?;
    submit_blocking(&state, move |service| service.submit(&name, &payload)).await
}

async fn submit_blocking<F>(state: &AppState, submit: F) -> Result<Json<SubmissionSummary>, ApiError>
where
    F: FnOnce(&InteractorService) -> Result<SubmissionSummary, ExportError> + Send + 'static,
{
    let service = state.interactors.clone();
    let summary = tokio::task::spawn_blocking(move || submit(&service))
        .await
        .map_err(|err| {
            tracing::error!(target: "pathex.http", error = %err, "submission task failed");
            ExportError::Internal("submission task failed".to_owned())
        })??;
    Ok(Json(summary))
}

async fn token_summary(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SubmissionSummary>, ApiError> {
    let service = state.interactors.clone();
    let summary = tokio::task::spawn_blocking(move || service.summary(&token))
        .await
        .map_err(|_| ExportError::Internal("token lookup task failed".to_owned()))?;
    summary.map(Json).ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        code: "NOT_FOUND",
        message: "unknown or expired token".to_owned(),
    })
}
