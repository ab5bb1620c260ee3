use crate::{
    api::{error::ApiError, response::ApiResponse},
    db::graph,
    pipeline,
    state::AppState,
    store::{self, MasterStore, StagingLog},
    supervisor::StartOutcome,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

// Create router with all control routes
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingestion/status", get(ingestion_status))
        .route("/ingestion/start", post(start_ingestion))
        .route("/ingestion/stop", post(stop_ingestion))
        .route("/merge", post(merge_staging))
        .route("/reconcile", post(reconcile_and_materialize))
        .route("/graph/stats", get(graph_stats))
        .with_state(app_state)
}

// GET /ingestion/status handler
async fn ingestion_status(State(state): State<Arc<AppState>>) -> Response {
    let status = state.supervisor.lock().await.status().await;
    ApiResponse::new(status).into_response()
}

// POST /ingestion/start handler
async fn start_ingestion(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let outcome = state.supervisor.lock().await.start().await?;

    let status = match outcome {
        StartOutcome::Started { ref worker } => {
            info!("Real-time ingestion started (pid {})", worker.pid);
            StatusCode::CREATED
        }
        StartOutcome::AlreadyRunning { .. } => StatusCode::OK,
    };
    Ok(ApiResponse::new(outcome).with_status(status))
}

// POST /ingestion/stop handler
async fn stop_ingestion(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let outcome = state.supervisor.lock().await.stop().await?;
    Ok(ApiResponse::new(outcome).into_response())
}

// POST /merge handler
async fn merge_staging(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let config = &state.config;
    let staging = StagingLog::new(&config.staging_path);
    let master = MasterStore::new(&config.master_path, config.master_on_corrupt);

    let report = store::merge(&staging, &master).await?;
    Ok(ApiResponse::new(report).into_response())
}

// POST /reconcile handler
async fn reconcile_and_materialize(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let report = pipeline::run_backfill(&state.config, &state.db_pool).await?;
    Ok(ApiResponse::new(report).into_response())
}

// GET /graph/stats handler
async fn graph_stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let stats = graph::graph_stats(&state.db_pool).await?;
    Ok(ApiResponse::new(stats).into_response())
}
