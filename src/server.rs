//! HTTP front end: generation, health and template publishing.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{Result, SwitchgenError};
use crate::generate::GenerationOrchestrator;
use crate::output::{
    ErrorResponse, GenerateResponse, HealthResponse, SyncResponse, TemplateDetailResponse,
    TemplateListResponse,
};
use crate::templates::template_elements;
use crate::types::{GenerateRequest, Template};

/// Template configurations carry inline images, so bodies get large.
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub started: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<GenerationOrchestrator>) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/generate", post(generate))
        .route("/api/health", get(health))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/sync", post(sync_template))
        .route("/api/templates/{api_name}", get(get_template))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

/// Binds, pre-warms the browser and serves until Ctrl-C or SIGTERM.
///
/// The browser is closed after the server has drained.
pub async fn serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((bind, port)).await?;
    info!(
        addr = %listener.local_addr()?,
        workers = state.orchestrator.worker_count(),
        "switchgen listening"
    );

    let lifecycle = Arc::clone(state.orchestrator.lifecycle());
    tokio::spawn(async move { lifecycle.prewarm().await });

    let orchestrator = Arc::clone(&state.orchestrator);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.lifecycle().shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Request-level failure rendered as `{success: false, error, ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(message),
        }
    }

    fn with_duration(mut self, started: Instant) -> Self {
        self.body = self.body.with_duration(elapsed_ms(started));
        self
    }
}

impl From<SwitchgenError> for ApiError {
    fn from(err: SwitchgenError) -> Self {
        let status = match &err {
            SwitchgenError::BadRequest(_) | SwitchgenError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            SwitchgenError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            SwitchgenError::BadRequest(message) => message.clone(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            body: ErrorResponse::new(message).with_details(err.to_payload()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

async fn generate(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> std::result::Result<Json<GenerateResponse>, ApiError> {
    let started = Instant::now();
    let Json(request) = payload.map_err(|e| ApiError::from(e).with_duration(started))?;

    let outcome = state
        .orchestrator
        .generate(request)
        .await
        .map_err(|e| ApiError::from(e).with_duration(started))?;

    Ok(Json(GenerateResponse {
        success: true,
        duration_ms: elapsed_ms(started),
        count: outcome.results.len(),
        sizes: outcome.results,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(HealthResponse {
        success: true,
        browser_connected: orchestrator.lifecycle().is_connected(),
        browser_generation: orchestrator.lifecycle().generation(),
        queue_length: orchestrator.queue_depth(),
        busy: orchestrator.is_busy(),
        worker_count: orchestrator.worker_count(),
        uptime_secs: state.started.elapsed().as_secs(),
        memory_usage_mb: resident_memory_mb(),
    })
}

fn resident_memory_mb() -> Option<u64> {
    memory_stats::memory_stats().map(|stats| (stats.physical_mem / (1024 * 1024)) as u64)
}

async fn list_templates(
    State(state): State<AppState>,
) -> std::result::Result<Json<TemplateListResponse>, ApiError> {
    let templates = state.orchestrator.templates().list().await?;
    Ok(Json(TemplateListResponse {
        success: true,
        templates,
    }))
}

async fn get_template(
    State(state): State<AppState>,
    Path(api_name): Path<String>,
) -> std::result::Result<Json<TemplateDetailResponse>, ApiError> {
    let template = state
        .orchestrator
        .templates()
        .get_by_api_name(&api_name)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Template not found"))?;

    Ok(Json(TemplateDetailResponse {
        success: true,
        elements: template_elements(&template.configuration),
        api_name: template.api_name,
        display_name: template.display_name,
    }))
}

async fn sync_template(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> std::result::Result<Json<SyncResponse>, ApiError> {
    let Json(body) = payload?;

    let present = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.trim().is_empty())
    };
    if !present("id") || !present("apiName") {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing template data"));
    }

    let template: Template = serde_json::from_value(body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid template: {e}")))?;
    let api_name = template.api_name.clone();
    state.orchestrator.templates().save(template).await?;
    info!(template = %api_name, "template synced");

    Ok(Json(SyncResponse {
        success: true,
        message: "Template synced to API backend".to_string(),
    }))
}
