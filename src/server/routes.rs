//! HTTP API route handlers

use crate::app::App;
use crate::types::{IngestRequest, IngestResponse, JobListResponse, SearchRequest, SearchResponse};
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/jobs", get(handle_list_jobs))
        .route("/api/jobs/:job_id", get(handle_get_job))
        .route("/api/jobs/:job_id/ws", get(handle_job_stream))
        .route("/api/search", post(handle_search))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn handle_ingest(
    State(app): State<Arc<App>>,
    Json(payload): Json<IngestRequest>,
) -> impl IntoResponse {
    if let Some(path) = payload.file_path {
        if !path.exists() {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "File not found" })),
            );
        }
        let job_id = app.service.ingest_file(path, payload.metadata);
        return (
            StatusCode::ACCEPTED,
            Json(json!(IngestResponse { job_id })),
        );
    }

    if let Some(url) = payload.url {
        let job_id = app.service.ingest_url(&url, payload.metadata);
        return (
            StatusCode::ACCEPTED,
            Json(json!(IngestResponse { job_id })),
        );
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Either file_path or url must be provided" })),
    )
}

async fn handle_list_jobs(State(app): State<Arc<App>>) -> impl IntoResponse {
    let jobs = app.service.list_jobs();
    (StatusCode::OK, Json(json!(JobListResponse { jobs })))
}

async fn handle_get_job(
    State(app): State<Arc<App>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match app.service.get_job(&job_id) {
        Some(status) => (StatusCode::OK, Json(json!(status))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found" })),
        ),
    }
}

/// Upgrade to a WebSocket and relay job snapshots until the client
/// disconnects. Delivery is lossy by design; clients needing reliable
/// history poll the status endpoint.
async fn handle_job_stream(
    State(app): State<Arc<App>>,
    Path(job_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_job_updates(app, job_id, socket))
}

async fn stream_job_updates(app: Arc<App>, job_id: String, mut socket: WebSocket) {
    let mut subscription = app.service.subscribe(&job_id);
    loop {
        tokio::select! {
            update = subscription.rx.recv() => {
                let Some(status) = update else { break };
                let Ok(payload) = serde_json::to_string(&status) else { break };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    app.service.unsubscribe(&subscription);
}

async fn handle_search(
    State(app): State<Arc<App>>,
    Json(payload): Json<SearchRequest>,
) -> impl IntoResponse {
    match app
        .search
        .search(
            &payload.query,
            payload.top_k,
            payload.offset,
            payload.filters.as_ref(),
        )
        .await
    {
        Ok(matches) => (
            StatusCode::OK,
            Json(json!(SearchResponse {
                query: payload.query,
                matches,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}
